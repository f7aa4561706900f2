//! Split worker: executes a plan, writing one workbook per distinct value.

use std::fs;
use std::path::{Path, PathBuf};

use colsplit_io_xlsx::{
    C_EXT_XLSX, EnumCellValue, TableIoError, derive_column_cells, write_table,
};
use polars::prelude::{BooleanChunked, DataFrame, NewChunkedArray, PlSmallStr};
use tracing::{debug, error, info};

use crate::sanitize::{NameAllocator, sanitize_path_component};
use crate::spec::{
    EnumProgressEvent, EnumSplitOutcome, SpecSplitColumn, SpecSplitOptions, SpecSplitPlan,
    SplitCancelToken, SplitWorkerError,
};

/// Unit-level result of processing one column.
enum EnumColumnStep {
    Done,
    Cancelled,
}

/// Mutable progress shared by all columns of one run.
struct SplitRunState<'a, F> {
    df: &'a DataFrame,
    path_dir_out: &'a Path,
    cancel: &'a SplitCancelToken,
    options: &'a SpecSplitOptions,
    emit: F,
    cnt_done_total: usize,
}

/// Run `plan` against `df`, writing into `path_dir_out`.
///
/// Columns and values are processed sequentially in plan order. Cancellation
/// is checked before each column and before each value. The first
/// filesystem error ends the job; files already written stay on disk.
/// Exactly one terminal event (`Failed` or `Finished`) is emitted.
pub fn run_split<F>(
    df: &DataFrame,
    plan: &SpecSplitPlan,
    path_dir_out: &Path,
    cancel: &SplitCancelToken,
    options: &SpecSplitOptions,
    emit: F,
) -> EnumSplitOutcome
where
    F: FnMut(EnumProgressEvent),
{
    let mut state = SplitRunState {
        df,
        path_dir_out,
        cancel,
        options,
        emit,
        cnt_done_total: 0,
    };

    match state.run_columns(plan) {
        Ok(EnumColumnStep::Done) => {
            info!(
                units = state.cnt_done_total,
                path = %path_dir_out.display(),
                "split finished"
            );
            (state.emit)(EnumProgressEvent::Finished { cancelled: false });
            EnumSplitOutcome::Completed
        }
        Ok(EnumColumnStep::Cancelled) => {
            info!(
                units = state.cnt_done_total,
                total = plan.cnt_units_total,
                "split cancelled"
            );
            (state.emit)(EnumProgressEvent::Log {
                message: format!(
                    "Cancelled after {} of {} file(s).",
                    state.cnt_done_total, plan.cnt_units_total
                ),
            });
            (state.emit)(EnumProgressEvent::Finished { cancelled: true });
            EnumSplitOutcome::Cancelled
        }
        Err(err) => {
            error!(units = state.cnt_done_total, "split failed: {err}");
            (state.emit)(EnumProgressEvent::Failed {
                message: err.to_string(),
            });
            EnumSplitOutcome::Failed(err)
        }
    }
}

impl<F> SplitRunState<'_, F>
where
    F: FnMut(EnumProgressEvent),
{
    fn run_columns(&mut self, plan: &SpecSplitPlan) -> Result<EnumColumnStep, SplitWorkerError> {
        let mut allocator_dirs = NameAllocator::new(self.options.rule_name_collision);

        for column in &plan.columns {
            if self.cancel.is_cancelled() {
                return Ok(EnumColumnStep::Cancelled);
            }

            let c_dir_sanitized = sanitize_path_component(&column.name);
            let name_dir = allocator_dirs.allocate(&c_dir_sanitized);
            if name_dir.if_renamed {
                (self.emit)(EnumProgressEvent::Log {
                    message: format!(
                        "Directory name {c_dir_sanitized:?} already used; \
                         column {:?} writes to {:?}.",
                        column.name, name_dir.name
                    ),
                });
            }

            let path_dir_col = self.path_dir_out.join(&name_dir.name);
            fs::create_dir_all(&path_dir_col).map_err(|e| SplitWorkerError::DirectoryCreate {
                column: column.name.clone(),
                path: path_dir_col.clone(),
                message: e.to_string(),
            })?;

            (self.emit)(EnumProgressEvent::ColumnStarted {
                column: column.name.clone(),
                cnt_units: column.cnt_units,
            });

            if let EnumColumnStep::Cancelled = self.run_units(column, &path_dir_col)? {
                return Ok(EnumColumnStep::Cancelled);
            }
        }

        Ok(EnumColumnStep::Done)
    }

    fn run_units(
        &mut self,
        column: &SpecSplitColumn,
        path_dir_col: &Path,
    ) -> Result<EnumColumnStep, SplitWorkerError> {
        let err_frame = |message: String| SplitWorkerError::Frame {
            column: column.name.clone(),
            message,
        };
        let l_cells = self
            .df
            .column(&column.name)
            .map_err(|e| err_frame(e.to_string()))
            .and_then(|col| derive_column_cells(col).map_err(err_frame))?;

        let mut allocator_files = NameAllocator::new(self.options.rule_name_collision);
        let mut cnt_done_column = 0usize;

        for value in &column.distinct_values {
            if self.cancel.is_cancelled() {
                return Ok(EnumColumnStep::Cancelled);
            }

            let df_subset = derive_matching_rows(self.df, &l_cells, value).map_err(err_frame)?;

            let c_file_sanitized = sanitize_path_component(&value.to_string_form());
            let name_file = allocator_files.allocate(&c_file_sanitized);
            if name_file.if_renamed {
                (self.emit)(EnumProgressEvent::Log {
                    message: format!(
                        "File name {c_file_sanitized:?} already used in {:?}; \
                         value {:?} writes to {:?}.",
                        column.name,
                        value.to_string_form(),
                        name_file.name
                    ),
                });
            }
            let path_file_out = path_dir_col.join(format!("{}.{C_EXT_XLSX}", name_file.name));

            write_table(&df_subset, &path_file_out)
                .map_err(|e| derive_write_error(column, value, &path_file_out, e))?;

            cnt_done_column += 1;
            self.cnt_done_total += 1;
            debug!(
                column = %column.name,
                value = %value,
                rows = df_subset.height(),
                path = %path_file_out.display(),
                "unit written"
            );
            (self.emit)(EnumProgressEvent::UnitCompleted {
                column: column.name.clone(),
                cnt_done_column,
                cnt_done_total: self.cnt_done_total,
            });
            (self.emit)(EnumProgressEvent::Log {
                message: format!(
                    "Wrote {} row(s) to {}",
                    df_subset.height(),
                    path_file_out.display()
                ),
            });
        }

        Ok(EnumColumnStep::Done)
    }
}

/// Rows of `df` whose cell in `cells` matches `value`, in table order.
fn derive_matching_rows(
    df: &DataFrame,
    cells: &[EnumCellValue],
    value: &EnumCellValue,
) -> Result<DataFrame, String> {
    let l_mask: Vec<bool> = cells.iter().map(|cell| cell.is_matching(value)).collect();
    let mask = BooleanChunked::from_slice(PlSmallStr::from_static("mask"), &l_mask);
    df.filter(&mask).map_err(|e| e.to_string())
}

fn derive_write_error(
    column: &SpecSplitColumn,
    value: &EnumCellValue,
    path_file_out: &Path,
    err: TableIoError,
) -> SplitWorkerError {
    let message = match err {
        TableIoError::Write { message, .. } => message,
        other => other.to_string(),
    };
    SplitWorkerError::Write {
        column: column.name.clone(),
        value: value.to_string_form(),
        path: PathBuf::from(path_file_out),
        message,
    }
}
