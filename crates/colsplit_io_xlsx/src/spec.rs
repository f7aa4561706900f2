//! Shared table/XLSX models and errors.

use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDateTime, NaiveTime};

////////////////////////////////////////////////////////////////////////////////
// #region CellValue

/// Normalized cell value shared by the reader, the writer and the splitter.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
    /// Date or date-time value (no time zone).
    DateTime(NaiveDateTime),
}

/// Hashable identity of a non-missing cell value.
///
/// Numbers are keyed by bit pattern after folding `-0.0` into `0.0` and every
/// NaN into one canonical NaN, so `Eq`/`Hash` agree with value equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumCellKey {
    /// Key of a numeric value.
    Number(u64),
    /// Key of a text value.
    String(String),
    /// Key of a boolean value.
    Boolean(bool),
    /// Key of a date-time value.
    DateTime(NaiveDateTime),
}

impl EnumCellValue {
    /// Whether the cell is missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::None)
    }

    /// String form of the value (`""` for missing).
    ///
    /// Integral numbers print without a fractional part (`3`, not `3.0`).
    /// Dates at midnight print as `YYYY-MM-DD`, other date-times as
    /// `YYYY-MM-DD HH:MM:SS`.
    pub fn to_string_form(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::String(val) => val.clone(),
            Self::Number(val) => format_number(*val),
            Self::Boolean(val) => if *val { "True" } else { "False" }.to_string(),
            Self::DateTime(val) if val.time() == NaiveTime::MIN => {
                val.format("%Y-%m-%d").to_string()
            }
            Self::DateTime(val) => val.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Typed key, `None` for missing cells.
    pub fn key(&self) -> Option<EnumCellKey> {
        match self {
            Self::None => None,
            Self::String(val) => Some(EnumCellKey::String(val.clone())),
            Self::Number(val) => {
                let n_canonical = if val.is_nan() {
                    f64::NAN
                } else if *val == 0.0 {
                    0.0
                } else {
                    *val
                };
                Some(EnumCellKey::Number(n_canonical.to_bits()))
            }
            Self::Boolean(val) => Some(EnumCellKey::Boolean(*val)),
            Self::DateTime(val) => Some(EnumCellKey::DateTime(*val)),
        }
    }

    /// Equality on the typed value: `100` and `"100"` are different values.
    ///
    /// Missing never matches anything, including another missing cell.
    pub fn is_matching(&self, other: &EnumCellValue) -> bool {
        match (self.key(), other.key()) {
            (Some(key_self), Some(key_other)) => key_self == key_other,
            _ => false,
        }
    }
}

impl fmt::Display for EnumCellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_form())
    }
}

fn format_number(val: f64) -> String {
    if val.is_nan() {
        return "NaN".to_string();
    }
    if val.is_infinite() {
        return if val.is_sign_positive() {
            "Inf".to_string()
        } else {
            "-Inf".to_string()
        };
    }
    // `Display` for f64 already drops the `.0` of integral values.
    format!("{val}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatModels

/// Horizontal placement of cell content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCellAlign {
    /// Excel default placement (text left, numbers right).
    General,
    /// Left aligned.
    Left,
    /// Centered.
    Center,
    /// Right aligned.
    Right,
}

/// Cell format preset mapped onto `rust_xlsxwriter::Format`.
///
/// `None` fields leave the Excel default in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<f64>,
    /// Bold text.
    pub bold: Option<bool>,
    /// Horizontal alignment.
    pub align: Option<EnumCellAlign>,
    /// Vertically center content.
    pub if_vcenter: Option<bool>,
    /// Thin border on all sides.
    pub if_border: Option<bool>,
    /// Number format code.
    pub num_format: Option<String>,
}

impl SpecCellFormat {
    /// Copy of `self` with every field set in `patch` taking precedence.
    pub fn overlay(&self, patch: SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: patch.font_name.or_else(|| self.font_name.clone()),
            font_size: patch.font_size.or(self.font_size),
            bold: patch.bold.or(self.bold),
            align: patch.align.or(self.align),
            if_vcenter: patch.if_vcenter.or(self.if_vcenter),
            if_border: patch.if_border.or(self.if_border),
            num_format: patch.num_format.or_else(|| self.num_format.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Header-driven column width policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Disable autofit entirely when `false`.
    pub if_enabled: bool,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            if_enabled: true,
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Writer-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxWriteOptions {
    /// Freeze the header row.
    pub if_freeze_header: bool,
    /// Column width policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
}

impl Default for SpecXlsxWriteOptions {
    fn default() -> Self {
        Self {
            if_freeze_header: true,
            policy_autofit: SpecAutofitCellsPolicy::default(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportModels

/// Concrete sheet part emitted to workbook (after Excel-limit slicing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetSlice {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Inclusive source row start.
    pub row_start_inclusive: usize,
    /// Exclusive source row end.
    pub row_end_exclusive: usize,
    /// Inclusive source column start.
    pub col_start_inclusive: usize,
    /// Exclusive source column end.
    pub col_end_exclusive: usize,
}

impl SpecSheetSlice {
    /// Number of data rows held by this slice.
    pub fn height(&self) -> usize {
        self.row_end_exclusive - self.row_start_inclusive
    }
}

/// Per-write call report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Sheet slices produced by the write call.
    pub sheets: Vec<SpecSheetSlice>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }

    /// Total data rows written across all sheets.
    pub fn cnt_rows(&self) -> usize {
        self.sheets
            .iter()
            .filter(|s| s.col_start_inclusive == 0)
            .map(SpecSheetSlice::height)
            .sum()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Table load/save failures.
#[derive(Debug, thiserror::Error)]
pub enum TableIoError {
    /// Workbook could not be opened or parsed.
    #[error("Failed to load table from {}: {message}", path.display())]
    Open {
        /// Input workbook path.
        path: PathBuf,
        /// Underlying reader error text.
        message: String,
    },
    /// First worksheet is missing or has no header row.
    #[error("No header row found in first worksheet of {}", path.display())]
    MissingHeader {
        /// Input workbook path.
        path: PathBuf,
    },
    /// Header row repeats a column name.
    #[error("{0}")]
    DuplicateColumns(String),
    /// In-memory frame construction or access failed.
    #[error("Table frame error: {0}")]
    Frame(String),
    /// Workbook could not be written.
    #[error("Failed to write {}: {message}", path.display())]
    Write {
        /// Output workbook path.
        path: PathBuf,
        /// Underlying writer error text.
        message: String,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
