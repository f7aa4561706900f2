//! XLSX writer kernel that turns an in-memory `DataFrame` into a workbook.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use polars::prelude::{DataFrame, DataType};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use tracing::warn;

use crate::conf::{
    C_SHEET_NAME_DEFAULT, EnumFmtKey, N_LEN_EXCEL_SHEET_NAME_MAX, derive_default_xlsx_formats,
};
use crate::spec::{
    EnumCellAlign, EnumCellValue, SpecAutofitCellsPolicy, SpecCellFormat, SpecSheetSlice,
    SpecXlsxReport, SpecXlsxWriteOptions, TableIoError,
};
use crate::util::{
    derive_column_cells, derive_excel_serial_from_datetime, estimate_unicode_string_width,
    plan_sheet_slices, sanitize_sheet_name, validate_unique_columns,
};

/// Write `df` as a standalone workbook at `path` (one sheet, header row first).
///
/// Column order is preserved and no index column is written.
pub fn write_table<P: AsRef<Path>>(
    df: &DataFrame,
    path: P,
) -> Result<SpecXlsxReport, TableIoError> {
    let mut writer = XlsxWriter::with_defaults(path.as_ref().to_path_buf());
    let report = writer.write_sheet(df, C_SHEET_NAME_DEFAULT)?;
    writer.close()?;
    Ok(report)
}

/// Stateful workbook writer.
pub struct XlsxWriter {
    path_file_out: PathBuf,
    workbook: Workbook,
    dict_fmts: BTreeMap<EnumFmtKey, SpecCellFormat>,
    write_options: SpecXlsxWriteOptions,
    set_sheet_names_existing: BTreeSet<String>,
    l_reports: Vec<SpecXlsxReport>,
    if_closed: bool,
}

impl XlsxWriter {
    /// Create writer bound to output path and format/options presets.
    ///
    /// The workbook is buffered in memory until [`Self::close`] is called.
    pub fn new(
        path_file_out: PathBuf,
        dict_fmts: BTreeMap<EnumFmtKey, SpecCellFormat>,
        write_options: SpecXlsxWriteOptions,
    ) -> Self {
        Self {
            path_file_out,
            workbook: Workbook::new(),
            dict_fmts,
            write_options,
            set_sheet_names_existing: BTreeSet::new(),
            l_reports: Vec::new(),
            if_closed: false,
        }
    }

    /// Create writer with [`derive_default_xlsx_formats`] and default options.
    pub fn with_defaults(path_file_out: PathBuf) -> Self {
        Self::new(
            path_file_out,
            derive_default_xlsx_formats(),
            SpecXlsxWriteOptions::default(),
        )
    }

    /// Return output file path.
    pub fn file_out(&self) -> &Path {
        &self.path_file_out
    }

    /// Return immutable snapshot of per-sheet write reports.
    pub fn report(&self) -> Vec<SpecXlsxReport> {
        self.l_reports.clone()
    }

    /// Flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<(), TableIoError> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook
            .save(&self.path_file_out)
            .map_err(|err| self.derive_write_error(derive_xlsx_error_text(err)))?;
        self.if_closed = true;
        Ok(())
    }

    /// Write one table as a sheet (split over several sheets past Excel limits).
    pub fn write_sheet(
        &mut self,
        df: &DataFrame,
        sheet_name: &str,
    ) -> Result<SpecXlsxReport, TableIoError> {
        if self.if_closed {
            return Err(self.derive_write_error("Cannot write after close().".to_string()));
        }
        match self.write_sheet_impl(df, sheet_name) {
            Ok(report) => {
                for c_warning in &report.warnings {
                    warn!(path = %self.path_file_out.display(), "{c_warning}");
                }
                self.l_reports.push(report.clone());
                Ok(report)
            }
            Err(message) => Err(self.derive_write_error(message)),
        }
    }

    fn write_sheet_impl(
        &mut self,
        df: &DataFrame,
        sheet_name: &str,
    ) -> Result<SpecXlsxReport, String> {
        let l_colnames_df: Vec<String> = df
            .get_column_names_str()
            .into_iter()
            .map(ToString::to_string)
            .collect();
        validate_unique_columns(&l_colnames_df)?;

        let l_fmt_keys_number: Vec<EnumFmtKey> = df
            .get_columns()
            .iter()
            .map(|col| derive_number_fmt_key(col.dtype()))
            .collect();
        let fmt_header = derive_rust_xlsx_format(&self.derive_fmt_spec(EnumFmtKey::Header));
        let dict_fmt_data: BTreeMap<EnumFmtKey, Format> = [
            EnumFmtKey::Text,
            EnumFmtKey::Integer,
            EnumFmtKey::Decimal,
            EnumFmtKey::Date,
            EnumFmtKey::DateTime,
        ]
        .into_iter()
        .map(|key| (key, derive_rust_xlsx_format(&self.derive_fmt_spec(key))))
        .collect();

        let mut report = SpecXlsxReport::default();
        let l_sheet_parts = plan_sheet_slices(
            df.height(),
            df.width(),
            &sanitize_sheet_name(sheet_name, "_"),
            &mut report,
        );

        for sheet_slice in l_sheet_parts {
            let sheet_name_unique = self.derive_unique_sheet_name(&sheet_slice.sheet_name);
            let policy_autofit = self.write_options.policy_autofit.clone();
            let if_freeze_header = self.write_options.if_freeze_header;

            let worksheet = self.workbook.add_worksheet();
            worksheet
                .set_name(&sheet_name_unique)
                .map_err(derive_xlsx_error_text)?;

            let l_header_slice =
                &l_colnames_df[sheet_slice.col_start_inclusive..sheet_slice.col_end_exclusive];
            for (n_idx_col, c_header) in l_header_slice.iter().enumerate() {
                worksheet
                    .write_string_with_format(0, cast_col_num(n_idx_col)?, c_header, &fmt_header)
                    .map_err(derive_xlsx_error_text)?;
            }
            if if_freeze_header {
                worksheet
                    .set_freeze_panes(1, 0)
                    .map_err(derive_xlsx_error_text)?;
            }

            let n_rows_slice = sheet_slice.height();
            for (n_idx_col, n_idx_col_abs) in
                (sheet_slice.col_start_inclusive..sheet_slice.col_end_exclusive).enumerate()
            {
                let col = df.get_columns()[n_idx_col_abs]
                    .slice(sheet_slice.row_start_inclusive as i64, n_rows_slice);
                let l_cells = derive_column_cells(&col)
                    .map_err(|err| format!("Failed to access cell value: {err}"))?;
                for (n_row_local, value) in l_cells.iter().enumerate() {
                    let fmt_key = derive_cell_fmt_key(l_fmt_keys_number[n_idx_col_abs], value);
                    let fmt_data = &dict_fmt_data[&fmt_key];
                    write_cell_with_format(worksheet, 1 + n_row_local, n_idx_col, value, fmt_data)?;
                }
            }

            apply_header_autofit(worksheet, l_header_slice, &policy_autofit)?;

            report.sheets.push(SpecSheetSlice {
                sheet_name: sheet_name_unique,
                ..sheet_slice
            });
        }

        Ok(report)
    }

    fn derive_fmt_spec(&self, key: EnumFmtKey) -> SpecCellFormat {
        self.dict_fmts.get(&key).cloned().unwrap_or_default()
    }

    fn derive_write_error(&self, message: String) -> TableIoError {
        TableIoError::Write {
            path: self.path_file_out.clone(),
            message,
        }
    }

    /// Reserve `name`, or `name__<n>` (n >= 2) when Excel would consider it
    /// taken. Sheet names compare case-insensitively.
    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n_idx = 1usize;
        while !self.set_sheet_names_existing.insert(candidate.to_lowercase()) {
            n_idx += 1;
            let c_suffix = format!("__{n_idx}");
            let c_base: String = name
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX.saturating_sub(c_suffix.len()))
                .collect();
            candidate = format!("{c_base}{c_suffix}");
        }
        candidate
    }
}

/// Format of the numeric cells of a column: `Integer` for integer dtypes,
/// including the number field of a mixed column.
fn derive_number_fmt_key(dtype: &DataType) -> EnumFmtKey {
    match dtype {
        DataType::Struct(l_fields) if l_fields.iter().any(|f| f.dtype().is_integer()) => {
            EnumFmtKey::Integer
        }
        _ if dtype.is_integer() => EnumFmtKey::Integer,
        _ => EnumFmtKey::Decimal,
    }
}

fn derive_cell_fmt_key(fmt_key_number: EnumFmtKey, value: &EnumCellValue) -> EnumFmtKey {
    match value {
        EnumCellValue::Number(_) => fmt_key_number,
        EnumCellValue::DateTime(val) if val.time() == NaiveTime::MIN => EnumFmtKey::Date,
        EnumCellValue::DateTime(_) => EnumFmtKey::DateTime,
        EnumCellValue::None | EnumCellValue::String(_) | EnumCellValue::Boolean(_) => {
            EnumFmtKey::Text
        }
    }
}

fn apply_header_autofit(
    worksheet: &mut Worksheet,
    header: &[String],
    policy_autofit: &SpecAutofitCellsPolicy,
) -> Result<(), String> {
    if !policy_autofit.if_enabled {
        return Ok(());
    }

    let n_min = usize::max(1, policy_autofit.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy_autofit.width_cell_max));
    for (n_idx_col, c_header) in header.iter().enumerate() {
        let n_width_recorded = estimate_unicode_string_width(c_header);
        let n_width_final = usize::min(
            n_max,
            usize::max(n_min, n_width_recorded + policy_autofit.width_cell_padding),
        );
        worksheet
            .set_column_width(cast_col_num(n_idx_col)?, n_width_final as f64)
            .map_err(derive_xlsx_error_text)?;
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), String> {
    let (row, col) = (cast_row_num(row_idx)?, cast_col_num(col_idx)?);
    let result = match value {
        EnumCellValue::None => worksheet.write_blank(row, col, format),
        EnumCellValue::Number(val) if val.is_finite() => {
            worksheet.write_number_with_format(row, col, *val, format)
        }
        // Excel has no NaN/Inf; keep their text form.
        EnumCellValue::Number(_) | EnumCellValue::String(_) => {
            worksheet.write_string_with_format(row, col, value.to_string_form(), format)
        }
        EnumCellValue::Boolean(val) => worksheet.write_boolean_with_format(row, col, *val, format),
        EnumCellValue::DateTime(val) => {
            let n_serial = derive_excel_serial_from_datetime(val);
            worksheet.write_number_with_format(row, col, n_serial, format)
        }
    };
    result.map_err(derive_xlsx_error_text)?;
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(name) = &spec.font_name {
        format = format.set_font_name(name);
    }
    if let Some(size) = spec.font_size {
        format = format.set_font_size(size);
    }
    if spec.bold == Some(true) {
        format = format.set_bold();
    }
    if let Some(align) = spec.align {
        format = format.set_align(match align {
            EnumCellAlign::General => FormatAlign::General,
            EnumCellAlign::Left => FormatAlign::Left,
            EnumCellAlign::Center => FormatAlign::Center,
            EnumCellAlign::Right => FormatAlign::Right,
        });
    }
    if spec.if_vcenter == Some(true) {
        format = format.set_align(FormatAlign::VerticalCenter);
    }
    if spec.if_border == Some(true) {
        format = format.set_border(FormatBorder::Thin);
    }
    if let Some(code) = &spec.num_format {
        format = format.set_num_format(code);
    }

    format
}

fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

fn derive_xlsx_error_text(err: XlsxError) -> String {
    format!("xlsx write error: {err}")
}

#[cfg(test)]
mod tests {
    use calamine::{Data, Reader, open_workbook_auto};
    use chrono::NaiveDate;
    use polars::prelude::{Column, NamedFrom, Series};

    use super::*;
    use crate::reader::derive_dataframe_from_rows;
    use crate::test_util::TestDir;

    fn sample_df() -> DataFrame {
        DataFrame::new(vec![
            Column::from(Series::new("Name".into(), &[Some("a"), None, Some("c")])),
            Column::from(Series::new("Qty".into(), &[1i64, 2, 3])),
            Column::from(Series::new("Ratio".into(), &[0.5f64, f64::NAN, 2.25])),
        ])
        .expect("frame")
    }

    fn read_rows(path: &Path) -> Vec<Vec<Data>> {
        let mut workbook = open_workbook_auto(path).expect("open");
        let range = workbook
            .worksheet_range_at(0)
            .expect("first sheet")
            .expect("range");
        range.rows().map(|row| row.to_vec()).collect()
    }

    #[test]
    fn test_write_table_header_and_cells() {
        let tmp = TestDir::new();
        let path_file = tmp.path().join("out.xlsx");

        let report = write_table(&sample_df(), &path_file).expect("write");
        assert_eq!(report.sheets.len(), 1);
        assert_eq!(report.sheets[0].sheet_name, "Sheet1");
        assert_eq!(report.cnt_rows(), 3);

        let l_rows = read_rows(&path_file);
        assert_eq!(l_rows.len(), 4);
        assert_eq!(
            l_rows[0],
            vec![
                Data::String("Name".to_string()),
                Data::String("Qty".to_string()),
                Data::String("Ratio".to_string()),
            ]
        );
        assert_eq!(l_rows[1][0], Data::String("a".to_string()));
        assert_eq!(l_rows[2][0], Data::Empty);
        assert_eq!(l_rows[3][1], Data::Float(3.0));
        assert_eq!(l_rows[2][2], Data::String("NaN".to_string()));
        assert_eq!(l_rows[3][2], Data::Float(2.25));
    }

    #[test]
    fn test_write_table_keeps_dates_booleans_and_mixed_cells() {
        let tmp = TestDir::new();
        let path_file = tmp.path().join("typed.xlsx");
        let dt = NaiveDate::from_ymd_opt(2023, 7, 15)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("datetime");
        let l_header = vec!["When".to_string(), "Code".to_string(), "Flag".to_string()];
        let l_rows = vec![
            vec![
                EnumCellValue::DateTime(dt),
                EnumCellValue::Number(100.0),
                EnumCellValue::Boolean(true),
            ],
            vec![
                EnumCellValue::None,
                EnumCellValue::String("N/A".to_string()),
                EnumCellValue::Boolean(false),
            ],
        ];
        let df = derive_dataframe_from_rows(&l_header, &l_rows).expect("frame");

        write_table(&df, &path_file).expect("write");

        let l_rows_read = read_rows(&path_file);
        let Data::DateTime(excel_dt) = &l_rows_read[1][0] else {
            panic!("expected a date cell, got {:?}", l_rows_read[1][0]);
        };
        assert_eq!(excel_dt.as_f64(), 45_122.0);
        assert_eq!(l_rows_read[1][1], Data::Float(100.0));
        assert_eq!(l_rows_read[2][1], Data::String("N/A".to_string()));
        assert_eq!(l_rows_read[1][2], Data::Bool(true));
        assert_eq!(l_rows_read[2][2], Data::Bool(false));
    }

    #[test]
    fn test_write_table_empty_frame_writes_header_only() {
        let tmp = TestDir::new();
        let path_file = tmp.path().join("empty.xlsx");
        let df = sample_df().slice(0, 0);

        let report = write_table(&df, &path_file).expect("write");
        assert_eq!(report.cnt_rows(), 0);
        assert_eq!(read_rows(&path_file).len(), 1);
    }

    #[test]
    fn test_write_table_into_directory_path_fails_with_path() {
        let tmp = TestDir::new();
        let path_dir = tmp.path().join("taken.xlsx");
        std::fs::create_dir_all(&path_dir).expect("mkdir");

        let err = write_table(&sample_df(), &path_dir).expect_err("must fail");
        assert!(matches!(err, TableIoError::Write { .. }));
        assert!(err.to_string().contains("taken.xlsx"));
    }

    #[test]
    fn test_writer_unique_sheet_names_and_close_idempotent() {
        let tmp = TestDir::new();
        let mut writer = XlsxWriter::with_defaults(tmp.path().join("multi.xlsx"));

        writer.write_sheet(&sample_df(), "Data").expect("first");
        let report = writer.write_sheet(&sample_df(), "Data").expect("second");
        assert_eq!(report.sheets[0].sheet_name, "Data__2");
        let report = writer.write_sheet(&sample_df(), "DATA").expect("third");
        assert_eq!(report.sheets[0].sheet_name, "DATA__3");
        assert_eq!(writer.report().len(), 3);

        writer.close().expect("close");
        writer.close().expect("close again");
        assert!(writer.file_out().exists());

        let err = writer
            .write_sheet(&sample_df(), "Late")
            .expect_err("write after close");
        assert!(err.to_string().contains("Cannot write after close()"));
    }
}
