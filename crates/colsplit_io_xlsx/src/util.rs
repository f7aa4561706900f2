//! Stateless helper utilities shared by the table reader and writer.

use std::collections::BTreeMap;

use calamine::{Data, DataType as _};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::{AnyValue, Column, DataType, TimeUnit};

use crate::conf::{
    N_EXCEL_SERIAL_UNIX_EPOCH_DAYS, N_LEN_EXCEL_SHEET_NAME_MAX, N_MILLIS_PER_DAY,
    N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::spec::{EnumCellValue, SpecSheetSlice, SpecXlsxReport};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Normalize one polars value into [`EnumCellValue`].
///
/// Numeric dtypes become numbers and `Datetime` becomes a naive date-time;
/// any other dtype keeps its text form.
pub fn derive_cell_value_from_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::None,
        AnyValue::String(val) => EnumCellValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::String(val.to_string()),
        AnyValue::Boolean(val) => EnumCellValue::Boolean(val),
        AnyValue::Datetime(val, unit, _) | AnyValue::DatetimeOwned(val, unit, _) => {
            derive_datetime_from_timestamp(val, unit)
                .map_or(EnumCellValue::None, EnumCellValue::DateTime)
        }
        _ if value.dtype().is_numeric() => value
            .extract::<f64>()
            .map_or(EnumCellValue::None, EnumCellValue::Number),
        _ => EnumCellValue::String(value.to_string()),
    }
}

/// Normalized cells of one column, in row order.
///
/// Mixed columns are stored as a struct with one field per cell type; each
/// row takes the first non-null field.
pub fn derive_column_cells(col: &Column) -> Result<Vec<EnumCellValue>, String> {
    if !matches!(col.dtype(), DataType::Struct(_)) {
        return (0..col.len())
            .map(|n_idx| {
                col.get(n_idx)
                    .map(derive_cell_value_from_any_value)
                    .map_err(|e| e.to_string())
            })
            .collect();
    }

    let l_fields = col.struct_().map_err(|e| e.to_string())?.fields_as_series();
    let mut l_cells = Vec::with_capacity(col.len());
    for n_idx in 0..col.len() {
        let mut cell = EnumCellValue::None;
        for field in &l_fields {
            let value = field.get(n_idx).map_err(|e| e.to_string())?;
            cell = derive_cell_value_from_any_value(value);
            if !cell.is_missing() {
                break;
            }
        }
        l_cells.push(cell);
    }
    Ok(l_cells)
}

/// Normalize one spreadsheet cell read by calamine into [`EnumCellValue`].
///
/// Cell errors (`#N/A`, `#DIV/0!`, ...) are treated as missing. Durations
/// keep their serial day count.
pub fn derive_cell_value_from_sheet_data(value: &Data) -> EnumCellValue {
    match value {
        Data::Empty | Data::Error(_) => EnumCellValue::None,
        Data::Int(val) => EnumCellValue::Number(*val as f64),
        Data::Float(val) => EnumCellValue::Number(*val),
        Data::Bool(val) => EnumCellValue::Boolean(*val),
        Data::DateTime(val) if val.is_datetime() => val
            .as_datetime()
            .map_or(EnumCellValue::Number(val.as_f64()), EnumCellValue::DateTime),
        Data::DateTime(val) => EnumCellValue::Number(val.as_f64()),
        Data::DateTimeIso(val) => value
            .as_datetime()
            .map_or_else(|| EnumCellValue::String(val.clone()), EnumCellValue::DateTime),
        Data::String(val) | Data::DurationIso(val) => EnumCellValue::String(val.clone()),
    }
}

/// Naive date-time of a polars timestamp, `None` when out of range.
pub fn derive_datetime_from_timestamp(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value)?,
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(value),
    };
    Some(dt.naive_utc())
}

/// Excel serial day number (1900 date system) of `value`.
pub fn derive_excel_serial_from_datetime(value: &NaiveDateTime) -> f64 {
    N_EXCEL_SERIAL_UNIX_EPOCH_DAYS + value.and_utc().timestamp_millis() as f64 / N_MILLIS_PER_DAY
}

/// Header text of one cell; blank cells yield an empty string.
pub fn derive_header_text_from_sheet_data(value: &Data) -> String {
    match value {
        Data::Empty | Data::Error(_) => String::new(),
        _ => derive_cell_value_from_sheet_data(value)
            .to_string_form()
            .trim()
            .to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DataFrameLikeUtils

/// Validate that `columns` has no duplicated names.
///
/// The error names every duplicate with its 0-based positions.
pub fn validate_unique_columns(columns: &[String]) -> Result<(), String> {
    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let l_duplicates: Vec<String> = dict_pos
        .into_iter()
        .filter(|(_, l_pos)| l_pos.len() > 1)
        .map(|(c_name, l_pos)| format!("{c_name:?} x{} at indices {l_pos:?}", l_pos.len()))
        .collect();
    if l_duplicates.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Duplicate column names detected: {}",
            l_duplicates.join("; ")
        ))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Excel-legal sheet name: illegal characters replaced by `replace_to`,
/// trimmed, capped at 31 characters, `Sheet` when nothing is left.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let c_replaced: String = name
        .chars()
        .map(|chr| {
            if TUP_EXCEL_ILLEGAL.contains(&chr) {
                replace_to.to_string()
            } else {
                chr.to_string()
            }
        })
        .collect();
    match c_replaced.trim() {
        "" => "Sheet".to_string(),
        c_trimmed => c_trimmed.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect(),
    }
}

/// Half-open `[start, end)` chunks of `0..total` no longer than `step`.
///
/// An empty range still yields one empty chunk so an empty table gets a
/// header-only sheet.
fn derive_spans(total: usize, step: usize) -> Vec<(usize, usize)> {
    if total == 0 {
        return vec![(0, 0)];
    }
    (0..total)
        .step_by(step)
        .map(|start| (start, usize::min(total, start + step)))
        .collect()
}

/// Split a `height_df` x `width_df` table into Excel-compliant sheet slices.
///
/// `height_df` counts data rows only; one header row is reserved per sheet.
/// Column chunks vary slowest, so slices of the same columns are adjacent.
pub fn plan_sheet_slices(
    height_df: usize,
    width_df: usize,
    sheet_name: &str,
    report: &mut SpecXlsxReport,
) -> Vec<SpecSheetSlice> {
    let l_col_spans = derive_spans(width_df, N_NCOLS_EXCEL_MAX);
    let l_row_spans = derive_spans(height_df, N_NROWS_EXCEL_MAX - 1);
    let if_split = l_col_spans.len() * l_row_spans.len() > 1;

    let l_slices: Vec<SpecSheetSlice> = l_col_spans
        .iter()
        .flat_map(|col_span| l_row_spans.iter().map(move |row_span| (*col_span, *row_span)))
        .enumerate()
        .map(|(n_idx, ((col_start, col_end), (row_start, row_end)))| SpecSheetSlice {
            sheet_name: if if_split {
                create_sheet_identifier(sheet_name, n_idx + 1)
            } else {
                sheet_name.to_string()
            },
            row_start_inclusive: row_start,
            row_end_exclusive: row_end,
            col_start_inclusive: col_start,
            col_end_exclusive: col_end,
        })
        .collect();

    if if_split {
        report.warn(format!(
            "Table exceeds Excel limits; written across {} sheets \
             ({} column chunk(s) x {} row chunk(s)).",
            l_slices.len(),
            l_col_spans.len(),
            l_row_spans.len()
        ));
    }
    l_slices
}

/// `base_<n>`, with `base` shortened so the result fits a sheet name.
pub fn create_sheet_identifier(base_name: &str, part_idx_1based: usize) -> String {
    let c_suffix = format!("_{part_idx_1based}");
    let n_len_base = N_LEN_EXCEL_SHEET_NAME_MAX
        .saturating_sub(c_suffix.len())
        .max(1);
    let c_base: String = base_name.chars().take(n_len_base).collect();
    c_base + &c_suffix
}

/// Estimate displayed width units of a text, counting non-ASCII as wider.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
