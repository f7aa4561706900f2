//! XLSX constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{EnumCellAlign, SpecCellFormat};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];

/// Extension of every workbook produced by [`crate::writer::write_table`].
pub const C_EXT_XLSX: &str = "xlsx";
/// Sheet name used when a table is written as a standalone workbook.
pub const C_SHEET_NAME_DEFAULT: &str = "Sheet1";
/// Header prefix for unnamed columns (`column_1`, `column_2`, ...).
pub const C_COLUMN_NAME_UNNAMED_PREFIX: &str = "column_";
/// Excel serial day number of 1970-01-01 (1900 date system).
pub const N_EXCEL_SERIAL_UNIX_EPOCH_DAYS: f64 = 25_569.0;
/// Milliseconds per day.
pub const N_MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Canonical format preset keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnumFmtKey {
    /// Generic text cell format.
    Text,
    /// Integer number format.
    Integer,
    /// Non-integer number format.
    Decimal,
    /// Calendar date format.
    Date,
    /// Date with time-of-day format.
    DateTime,
    /// Header cell format.
    Header,
}

/// Format presets used by [`crate::writer::XlsxWriter::with_defaults`].
///
/// Every preset shares the base font; the header adds bold, centered, boxed
/// text and number/date cells pick their format code by type.
pub fn derive_default_xlsx_formats() -> BTreeMap<EnumFmtKey, SpecCellFormat> {
    let fmt_base = SpecCellFormat {
        font_name: Some("Calibri".to_string()),
        font_size: Some(11.0),
        ..Default::default()
    };
    let fmt_header = fmt_base.overlay(SpecCellFormat {
        bold: Some(true),
        align: Some(EnumCellAlign::Center),
        if_vcenter: Some(true),
        if_border: Some(true),
        ..Default::default()
    });
    let derive_number_fmt = |code: &str| {
        fmt_base.overlay(SpecCellFormat {
            num_format: Some(code.to_string()),
            ..Default::default()
        })
    };

    BTreeMap::from([
        (EnumFmtKey::Integer, derive_number_fmt("0")),
        (EnumFmtKey::Decimal, derive_number_fmt("General")),
        (EnumFmtKey::Date, derive_number_fmt("yyyy-mm-dd")),
        (EnumFmtKey::DateTime, derive_number_fmt("yyyy-mm-dd hh:mm:ss")),
        (EnumFmtKey::Header, fmt_header),
        (EnumFmtKey::Text, fmt_base.clone()),
    ])
}
