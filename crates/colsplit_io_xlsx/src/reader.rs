//! Spreadsheet reader: first worksheet -> in-memory `DataFrame`.

use std::collections::BTreeSet;
use std::path::Path;

use calamine::{Reader, open_workbook_auto};
use polars::prelude::{
    Column, DataFrame, DataType, IntoSeries, NamedFrom, PlSmallStr, Series, StructChunked, TimeUnit,
};
use tracing::debug;

use crate::conf::C_COLUMN_NAME_UNNAMED_PREFIX;
use crate::spec::{EnumCellValue, TableIoError};
use crate::util::{
    derive_cell_value_from_sheet_data, derive_header_text_from_sheet_data,
    validate_unique_columns,
};

/// Largest magnitude at which every integer is exactly representable in f64.
const N_F64_INTEGER_EXACT_MAX: f64 = 9_007_199_254_740_992.0;
/// Padding cell for rows shorter than the header.
static CELL_MISSING: EnumCellValue = EnumCellValue::None;

/// Read the first worksheet of `path` into a `DataFrame`.
///
/// Row 0 is the header row. A column whose cells share one type gets the
/// matching dtype: `Int64` (all integral) or `Float64`, `String`, `Boolean`
/// or `Datetime[ms]`. A column mixing types becomes a struct with one field
/// per type, so every cell keeps its own type.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<DataFrame, TableIoError> {
    let path_file_in = path.as_ref();
    let err_open = |message: String| TableIoError::Open {
        path: path_file_in.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path_file_in).map_err(|e| err_open(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TableIoError::MissingHeader {
            path: path_file_in.to_path_buf(),
        })?
        .map_err(|e| err_open(e.to_string()))?;

    let mut iter_rows = range.rows();
    let Some(row_header) = iter_rows.next() else {
        return Err(TableIoError::MissingHeader {
            path: path_file_in.to_path_buf(),
        });
    };

    let l_header: Vec<String> = row_header
        .iter()
        .map(derive_header_text_from_sheet_data)
        .collect();
    let l_rows: Vec<Vec<EnumCellValue>> = iter_rows
        .map(|row| row.iter().map(derive_cell_value_from_sheet_data).collect())
        .collect();

    let df = derive_dataframe_from_rows(&l_header, &l_rows)?;
    debug!(
        path = %path_file_in.display(),
        rows = df.height(),
        columns = df.width(),
        "table loaded"
    );
    Ok(df)
}

/// Build a typed `DataFrame` from a header and row-major cells.
///
/// Blank header names become `column_<n>`; short rows are padded with
/// missing cells and cells beyond the header width are dropped.
pub fn derive_dataframe_from_rows(
    header: &[String],
    rows: &[Vec<EnumCellValue>],
) -> Result<DataFrame, TableIoError> {
    let l_colnames: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(n_idx, c_name)| {
            if c_name.is_empty() {
                format!("{C_COLUMN_NAME_UNNAMED_PREFIX}{}", n_idx + 1)
            } else {
                c_name.clone()
            }
        })
        .collect();
    validate_unique_columns(&l_colnames).map_err(TableIoError::DuplicateColumns)?;

    let mut l_columns = Vec::with_capacity(l_colnames.len());
    for (n_idx_col, c_name) in l_colnames.iter().enumerate() {
        let l_cells: Vec<&EnumCellValue> = rows
            .iter()
            .map(|row| row.get(n_idx_col).unwrap_or(&CELL_MISSING))
            .collect();
        l_columns.push(derive_column_from_cells(c_name, &l_cells).map_err(TableIoError::Frame)?);
    }

    DataFrame::new(l_columns).map_err(|e| TableIoError::Frame(e.to_string()))
}

/// Cell type of a non-missing value, in struct field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EnumCellKind {
    Number,
    Text,
    Boolean,
    DateTime,
}

impl EnumCellKind {
    fn of(cell: &EnumCellValue) -> Option<Self> {
        match cell {
            EnumCellValue::None => None,
            EnumCellValue::Number(_) => Some(Self::Number),
            EnumCellValue::String(_) => Some(Self::Text),
            EnumCellValue::Boolean(_) => Some(Self::Boolean),
            EnumCellValue::DateTime(_) => Some(Self::DateTime),
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
        }
    }
}

fn derive_column_from_cells(name: &str, cells: &[&EnumCellValue]) -> Result<Column, String> {
    let l_kinds: Vec<EnumCellKind> = cells
        .iter()
        .filter_map(|cell| EnumCellKind::of(cell))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let c_name = PlSmallStr::from(name);

    match l_kinds.as_slice() {
        [] => Ok(Column::from(Series::new(c_name, vec![None::<String>; cells.len()]))),
        [kind] => derive_series_of_kind(c_name, *kind, cells).map(Column::from),
        _ => {
            let l_fields = l_kinds
                .iter()
                .map(|kind| derive_series_of_kind(kind.field_name().into(), *kind, cells))
                .collect::<Result<Vec<Series>, String>>()?;
            StructChunked::from_series(c_name, cells.len(), l_fields.iter())
                .map(|ca| Column::from(ca.into_series()))
                .map_err(|e| e.to_string())
        }
    }
}

/// Series holding the cells of `kind`; cells of other kinds become null.
fn derive_series_of_kind(
    name: PlSmallStr,
    kind: EnumCellKind,
    cells: &[&EnumCellValue],
) -> Result<Series, String> {
    let series = match kind {
        EnumCellKind::Text => {
            let l_vals: Vec<Option<&str>> = cells
                .iter()
                .map(|cell| match cell {
                    EnumCellValue::String(val) => Some(val.as_str()),
                    _ => None,
                })
                .collect();
            Series::new(name, l_vals)
        }
        EnumCellKind::Boolean => {
            let l_vals: Vec<Option<bool>> = cells
                .iter()
                .map(|cell| match cell {
                    EnumCellValue::Boolean(val) => Some(*val),
                    _ => None,
                })
                .collect();
            Series::new(name, l_vals)
        }
        EnumCellKind::DateTime => {
            let l_vals: Vec<Option<i64>> = cells
                .iter()
                .map(|cell| match cell {
                    EnumCellValue::DateTime(val) => Some(val.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect();
            Series::new(name, l_vals)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| e.to_string())?
        }
        EnumCellKind::Number => derive_number_series(name, cells),
    };
    Ok(series)
}

/// `Int64` when every number is an exactly representable integer, else
/// `Float64`.
fn derive_number_series(name: PlSmallStr, cells: &[&EnumCellValue]) -> Series {
    let l_vals: Vec<Option<f64>> = cells
        .iter()
        .map(|cell| match cell {
            EnumCellValue::Number(val) => Some(*val),
            _ => None,
        })
        .collect();
    let if_all_integral = l_vals
        .iter()
        .flatten()
        .all(|val| val.fract() == 0.0 && val.abs() < N_F64_INTEGER_EXACT_MAX);

    if if_all_integral {
        let l_ints: Vec<Option<i64>> = l_vals.iter().map(|val| val.map(|v| v as i64)).collect();
        Series::new(name, l_ints)
    } else {
        Series::new(name, l_vals)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::prelude::AnyValue;

    use super::*;
    use crate::test_util::TestDir;
    use crate::util::derive_column_cells;
    use crate::writer::write_table;

    fn s(val: &str) -> EnumCellValue {
        EnumCellValue::String(val.to_string())
    }

    fn n(val: f64) -> EnumCellValue {
        EnumCellValue::Number(val)
    }

    #[test]
    fn test_rows_to_dataframe_infers_column_types() {
        let l_header = vec![
            "Region".to_string(),
            "Qty".to_string(),
            "Price".to_string(),
            "Mixed".to_string(),
            "Blank".to_string(),
        ];
        let l_rows = vec![
            vec![s("North"), n(1.0), n(2.5), n(7.0), EnumCellValue::None],
            vec![s("South"), EnumCellValue::None, n(3.0), s("x")],
        ];

        let df = derive_dataframe_from_rows(&l_header, &l_rows).expect("frame");
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("Region").expect("col").dtype(), &DataType::String);
        assert_eq!(df.column("Qty").expect("col").dtype(), &DataType::Int64);
        assert_eq!(df.column("Price").expect("col").dtype(), &DataType::Float64);
        assert!(matches!(
            df.column("Mixed").expect("col").dtype(),
            DataType::Struct(_)
        ));
        assert_eq!(df.column("Blank").expect("col").dtype(), &DataType::String);

        let col_mixed = df.column("Mixed").expect("col");
        assert_eq!(derive_column_cells(col_mixed).expect("cells"), vec![n(7.0), s("x")]);
        assert_eq!(df.column("Qty").expect("col").get(1).expect("cell"), AnyValue::Null);
    }

    #[test]
    fn test_rows_to_dataframe_keeps_booleans_and_dates() {
        let dt = NaiveDate::from_ymd_opt(2023, 7, 15)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("datetime");
        let l_header = vec!["When".to_string(), "Flag".to_string()];
        let l_rows = vec![
            vec![EnumCellValue::DateTime(dt), EnumCellValue::Boolean(true)],
            vec![EnumCellValue::None, EnumCellValue::Boolean(false)],
        ];

        let df = derive_dataframe_from_rows(&l_header, &l_rows).expect("frame");
        assert_eq!(
            df.column("When").expect("col").dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(df.column("Flag").expect("col").dtype(), &DataType::Boolean);
        assert_eq!(
            derive_column_cells(df.column("When").expect("col")).expect("cells"),
            vec![EnumCellValue::DateTime(dt), EnumCellValue::None]
        );
    }

    #[test]
    fn test_rows_to_dataframe_names_blank_headers() {
        let l_header = vec!["A".to_string(), String::new()];
        let df = derive_dataframe_from_rows(&l_header, &[]).expect("frame");
        assert_eq!(df.get_column_names_str(), vec!["A", "column_2"]);
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn test_rows_to_dataframe_rejects_duplicate_headers() {
        let l_header = vec!["A".to_string(), "A".to_string()];
        let err = derive_dataframe_from_rows(&l_header, &[]).expect_err("must fail");
        assert!(matches!(err, TableIoError::DuplicateColumns(_)));
    }

    #[test]
    fn test_read_table_missing_file_is_open_error() {
        let tmp = TestDir::new();
        let err = read_table(tmp.path().join("absent.xlsx")).expect_err("must fail");
        assert!(matches!(err, TableIoError::Open { .. }));
        assert!(err.to_string().contains("absent.xlsx"));
    }

    #[test]
    fn test_read_table_reads_back_written_workbook() {
        let tmp = TestDir::new();
        let path_file = tmp.path().join("sales.xlsx");

        let l_header = vec!["Region".to_string(), "Units".to_string()];
        let l_rows = vec![
            vec![s("North"), n(3.0)],
            vec![s("South"), EnumCellValue::None],
            vec![EnumCellValue::None, n(5.0)],
        ];
        let df_src = derive_dataframe_from_rows(&l_header, &l_rows).expect("frame");
        write_table(&df_src, &path_file).expect("write");

        let df = read_table(&path_file).expect("read");
        assert_eq!(df.get_column_names_str(), vec!["Region", "Units"]);
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("Units").expect("col").dtype(), &DataType::Int64);
        assert_eq!(
            df.column("Region").expect("col").get(0).expect("cell"),
            AnyValue::String("North")
        );
        assert_eq!(
            df.column("Region").expect("col").get(2).expect("cell"),
            AnyValue::Null
        );
    }

    #[test]
    fn test_read_table_keeps_typed_cells() {
        let tmp = TestDir::new();
        let path_file = tmp.path().join("typed.xlsx");
        let dt = NaiveDate::from_ymd_opt(2023, 7, 15)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("datetime");

        let l_header = vec!["When".to_string(), "Code".to_string(), "Flag".to_string()];
        let l_rows = vec![
            vec![EnumCellValue::DateTime(dt), n(100.0), EnumCellValue::Boolean(true)],
            vec![EnumCellValue::None, s("N/A"), EnumCellValue::Boolean(false)],
        ];
        let df_src = derive_dataframe_from_rows(&l_header, &l_rows).expect("frame");
        write_table(&df_src, &path_file).expect("write");

        let df = read_table(&path_file).expect("read");
        for c_name in ["When", "Code", "Flag"] {
            let col = df.column(c_name).expect("col");
            let col_src = df_src.column(c_name).expect("col");
            assert_eq!(col.dtype(), col_src.dtype(), "column {c_name}");
            assert_eq!(
                derive_column_cells(col).expect("cells"),
                derive_column_cells(col_src).expect("cells"),
                "column {c_name}"
            );
        }
    }
}
