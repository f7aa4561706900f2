//! `colsplit_io_xlsx` v1:
//! Tabular I/O kernel for the column splitter.
//!
//! Modules:
//! - `conf`   : constants and default presets
//! - `spec`   : cell values, formats, options, reports and errors
//! - `util`   : pure helper functions
//! - `reader` : spreadsheet -> `DataFrame`
//! - `writer` : `DataFrame` -> XLSX workbook
pub mod conf;
pub mod reader;
pub mod spec;
pub mod util;
pub mod writer;

#[cfg(test)]
mod test_util;

pub use conf::{C_EXT_XLSX, C_SHEET_NAME_DEFAULT, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
pub use reader::{derive_dataframe_from_rows, read_table};
pub use spec::{
    EnumCellAlign, EnumCellKey, EnumCellValue, SpecAutofitCellsPolicy, SpecCellFormat,
    SpecSheetSlice, SpecXlsxReport, SpecXlsxWriteOptions, TableIoError,
};
pub use util::{derive_cell_value_from_any_value, derive_column_cells, sanitize_sheet_name};
pub use writer::{XlsxWriter, write_table};
