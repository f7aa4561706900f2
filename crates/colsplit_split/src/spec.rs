//! Split plan/event models and top-level error types.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colsplit_io_xlsx::{EnumCellValue, TableIoError};
use serde::Serialize;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Policy for two outputs whose sanitized names collide in one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumNameCollisionStrategy {
    /// Keep the first name, suffix later ones with `__2`, `__3`, ...
    #[default]
    Disambiguate,
    /// Reuse the name; the later file replaces the earlier one.
    Overwrite,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PlanModels

/// One selected column and the distinct values it will be split on.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSplitColumn {
    /// Column name as it appears in the table header.
    pub name: String,
    /// Distinct non-missing values in first-occurrence order.
    pub distinct_values: Vec<EnumCellValue>,
    /// Number of units (one per distinct value).
    pub cnt_units: usize,
}

impl SpecSplitColumn {
    /// Build a column entry; `cnt_units` follows `distinct_values`.
    pub fn new(name: impl Into<String>, distinct_values: Vec<EnumCellValue>) -> Self {
        let cnt_units = distinct_values.len();
        Self {
            name: name.into(),
            distinct_values,
            cnt_units,
        }
    }
}

/// Immutable work plan for one split job.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSplitPlan {
    /// Selected columns in caller order.
    pub columns: Vec<SpecSplitColumn>,
    /// Sum of `cnt_units` over `columns`.
    pub cnt_units_total: usize,
}

impl SpecSplitPlan {
    /// Build a plan; `cnt_units_total` follows `columns`.
    pub fn new(columns: Vec<SpecSplitColumn>) -> Self {
        let cnt_units_total = columns.iter().map(|c| c.cnt_units).sum();
        Self {
            columns,
            cnt_units_total,
        }
    }

    /// `true` when there is nothing to split.
    pub fn is_empty(&self) -> bool {
        self.cnt_units_total == 0
    }
}

/// Input options for the split worker.
#[derive(Debug, Clone, Default)]
pub struct SpecSplitOptions {
    /// Behaviour when sanitized directory or file names collide.
    pub rule_name_collision: EnumNameCollisionStrategy,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Cancellation

/// Shared cooperative cancellation flag.
///
/// The worker reads it between units only; a unit in progress always runs to
/// completion or failure.
#[derive(Debug, Clone, Default)]
pub struct SplitCancelToken {
    flag: Arc<AtomicBool>,
}

impl SplitCancelToken {
    /// Fresh, not-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous request before a new job starts.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Events

/// Progress event emitted by the worker, in work-completion order.
///
/// Exactly one terminal event (`Failed` or `Finished`) ends each job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnumProgressEvent {
    /// Free-form log line.
    Log {
        /// Message text.
        message: String,
    },
    /// A column directory is ready and its units are about to run.
    ColumnStarted {
        /// Column name.
        column: String,
        /// Units planned for this column.
        cnt_units: usize,
    },
    /// One value file was written.
    UnitCompleted {
        /// Column name.
        column: String,
        /// Units done within this column.
        cnt_done_column: usize,
        /// Units done across the whole job.
        cnt_done_total: usize,
    },
    /// The job stopped on an unrecoverable error.
    Failed {
        /// Underlying error text with the path or column involved.
        message: String,
    },
    /// The job ended without error.
    Finished {
        /// Whether the job stopped early on request.
        cancelled: bool,
    },
}

impl EnumProgressEvent {
    /// Whether this event ends the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Finished { .. })
    }
}

/// Terminal state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumSplitOutcome {
    /// Every unit was written.
    Completed,
    /// Stopped at a unit boundary on request.
    Cancelled,
    /// Stopped at the first unrecoverable error.
    Failed(SplitWorkerError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Planner errors, returned before any worker starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitPlanError {
    /// Selection is empty.
    #[error("No columns selected for splitting.")]
    NoColumnsSelected,
    /// Selection names columns absent from the table.
    #[error("Column(s) not found in table: {}", .0.join(", "))]
    InvalidColumn(Vec<String>),
    /// A selected column could not be read.
    #[error("Failed to read column {column:?}: {message}")]
    Frame {
        /// Column name.
        column: String,
        /// Underlying frame error text.
        message: String,
    },
}

/// Worker errors, delivered as the terminal `Failed` event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitWorkerError {
    /// Column output directory could not be created.
    #[error("Failed to create directory {} for column {column:?}: {message}", path.display())]
    DirectoryCreate {
        /// Column name.
        column: String,
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
    /// Value file could not be written.
    #[error("Failed to write {} (column {column:?}, value {value:?}): {message}", path.display())]
    Write {
        /// Column name.
        column: String,
        /// String form of the value.
        value: String,
        /// Output file path.
        path: PathBuf,
        /// Underlying writer error text.
        message: String,
    },
    /// Table column could not be read or filtered.
    #[error("Failed to read column {column:?}: {message}")]
    Frame {
        /// Column name.
        column: String,
        /// Underlying frame error text.
        message: String,
    },
    /// Worker thread panicked before reaching a terminal state.
    #[error("Split worker panicked: {0}")]
    Panicked(String),
}

/// Background job start-up errors.
#[derive(Debug, thiserror::Error)]
pub enum SplitJobError {
    /// Worker thread could not be spawned.
    #[error("Failed to spawn split worker: {0}")]
    SpawnFailed(String),
}

/// Session-level errors surfaced to the caller synchronously.
#[derive(Debug, thiserror::Error)]
pub enum SplitSessionError {
    /// No table has been loaded yet.
    #[error("No table loaded.")]
    NoTableLoaded,
    /// Table load failed.
    #[error(transparent)]
    Load(#[from] TableIoError),
    /// Plan could not be built.
    #[error(transparent)]
    Plan(#[from] SplitPlanError),
    /// Every selected column is entirely missing.
    #[error("Nothing to split: selected columns have no non-missing values.")]
    NothingToSplit,
    /// A previous job is still running.
    #[error("A split job is already running.")]
    JobAlreadyRunning,
    /// Background job could not start.
    #[error(transparent)]
    Job(#[from] SplitJobError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_totals_follow_columns() {
        let plan = SpecSplitPlan::new(vec![
            SpecSplitColumn::new(
                "A",
                vec![
                    EnumCellValue::String("x".to_string()),
                    EnumCellValue::String("y".to_string()),
                ],
            ),
            SpecSplitColumn::new("B", vec![EnumCellValue::Number(1.0)]),
        ]);
        assert_eq!(plan.columns[0].cnt_units, 2);
        assert_eq!(plan.cnt_units_total, 3);
        assert!(!plan.is_empty());
        assert!(SpecSplitPlan::new(vec![SpecSplitColumn::new("C", vec![])]).is_empty());
    }

    #[test]
    fn test_cancel_token_shared_and_resettable() {
        let token = SplitCancelToken::new();
        let token_worker = token.clone();
        assert!(!token_worker.is_cancelled());

        token.cancel();
        assert!(token_worker.is_cancelled());

        token_worker.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_progress_event_terminal_flags() {
        let event = EnumProgressEvent::UnitCompleted {
            column: "Region".to_string(),
            cnt_done_column: 1,
            cnt_done_total: 2,
        };
        assert!(!event.is_terminal());
        assert!(EnumProgressEvent::Finished { cancelled: false }.is_terminal());
    }

    #[test]
    fn test_invalid_column_lists_all_names() {
        let err = SplitPlanError::InvalidColumn(vec!["X".to_string(), "Y".to_string()]);
        assert_eq!(err.to_string(), "Column(s) not found in table: X, Y");
    }
}
