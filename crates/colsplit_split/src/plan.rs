//! Partition planner: selected columns -> distinct values and unit totals.

use std::collections::HashSet;

use colsplit_io_xlsx::{EnumCellKey, EnumCellValue, derive_column_cells};
use polars::prelude::DataFrame;
use tracing::debug;

use crate::spec::{SpecSplitColumn, SpecSplitPlan, SplitPlanError};

/// Build a split plan for `selected` columns of `df`.
///
/// Duplicate selections are ignored after their first occurrence. Every
/// missing name is reported at once. A column whose cells are all missing
/// contributes zero units and is kept in the plan.
pub fn build_plan<S: AsRef<str>>(
    df: &DataFrame,
    selected: &[S],
) -> Result<SpecSplitPlan, SplitPlanError> {
    if selected.is_empty() {
        return Err(SplitPlanError::NoColumnsSelected);
    }

    let mut set_seen: HashSet<&str> = HashSet::new();
    let l_selected: Vec<&str> = selected
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| set_seen.insert(c))
        .collect();

    let set_table_cols: HashSet<&str> = df.get_column_names_str().into_iter().collect();
    let l_missing: Vec<String> = l_selected
        .iter()
        .filter(|c| !set_table_cols.contains(*c))
        .map(|c| c.to_string())
        .collect();
    if !l_missing.is_empty() {
        return Err(SplitPlanError::InvalidColumn(l_missing));
    }

    let mut l_columns = Vec::with_capacity(l_selected.len());
    for c_name in l_selected {
        let err_frame = |message: String| SplitPlanError::Frame {
            column: c_name.to_string(),
            message,
        };
        let col = df.column(c_name).map_err(|e| err_frame(e.to_string()))?;
        let l_cells = derive_column_cells(col).map_err(err_frame)?;
        let l_distinct = derive_distinct_values(&l_cells);
        debug!(column = c_name, units = l_distinct.len(), "column planned");
        l_columns.push(SpecSplitColumn::new(c_name, l_distinct));
    }

    Ok(SpecSplitPlan::new(l_columns))
}

/// Distinct non-missing values in first-occurrence order.
pub fn derive_distinct_values(cells: &[EnumCellValue]) -> Vec<EnumCellValue> {
    let mut set_keys: HashSet<EnumCellKey> = HashSet::new();
    cells
        .iter()
        .filter(|cell| cell.key().is_some_and(|key| set_keys.insert(key)))
        .cloned()
        .collect()
}
