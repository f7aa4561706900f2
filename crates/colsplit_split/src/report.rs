//! Split report models and the consumer-side event accumulator.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::EnumProgressEvent;

/// Aggregate counters and diagnostics for one split job, as seen by the
/// event consumer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportSplit {
    /// Columns whose directory was created and whose units started.
    pub cnt_columns_started: u64,
    /// Units planned for the job.
    pub cnt_units_total: u64,
    /// Units completed (files written).
    pub cnt_units_completed: u64,
    /// `Log` events observed.
    pub cnt_logs: u64,
    /// Whether the job ended on a cancellation request.
    pub if_cancelled: bool,
    /// Failure message, if the job failed.
    pub failure: Option<String>,
    /// Non-fatal warnings collected by the consumer.
    pub warnings: Vec<String>,
}

impl ReportSplit {
    /// Whether the job ended with a `Failed` event.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_columns_started".to_string(), self.cnt_columns_started);
        dict_counts.insert("cnt_units_total".to_string(), self.cnt_units_total);
        dict_counts.insert("cnt_units_completed".to_string(), self.cnt_units_completed);
        dict_counts.insert("cnt_logs".to_string(), self.cnt_logs);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} columns={} units={}/{} logs={} warnings={} cancelled={} failed={}",
            dict_counts["cnt_columns_started"],
            dict_counts["cnt_units_completed"],
            dict_counts["cnt_units_total"],
            dict_counts["cnt_logs"],
            dict_counts["cnt_warnings"],
            self.if_cancelled,
            self.is_failed()
        )
    }
}

impl fmt::Display for ReportSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[SPLIT]"))
    }
}

/// Mutable accumulator fed with progress events in arrival order.
#[derive(Debug, Default, Clone)]
pub struct ReportSplitBuilder {
    /// See [`ReportSplit::cnt_columns_started`].
    pub cnt_columns_started: u64,
    /// See [`ReportSplit::cnt_units_total`].
    pub cnt_units_total: u64,
    /// See [`ReportSplit::cnt_units_completed`].
    pub cnt_units_completed: u64,
    /// See [`ReportSplit::cnt_logs`].
    pub cnt_logs: u64,
    /// See [`ReportSplit::if_cancelled`].
    pub if_cancelled: bool,
    /// See [`ReportSplit::failure`].
    pub failure: Option<String>,
    /// See [`ReportSplit::warnings`].
    pub warnings: Vec<String>,
    if_terminated: bool,
}

impl ReportSplitBuilder {
    /// Empty builder for a job planned with `cnt_units_total` units.
    pub fn new(cnt_units_total: usize) -> Self {
        Self {
            cnt_units_total: cnt_units_total as u64,
            ..Default::default()
        }
    }

    /// Fold one event into the counters.
    ///
    /// Events after the terminal one are recorded as warnings and otherwise
    /// ignored.
    pub fn observe(&mut self, event: &EnumProgressEvent) {
        if self.if_terminated {
            self.add_warning(format!("Event after terminal event ignored: {event:?}"));
            return;
        }
        match event {
            EnumProgressEvent::Log { .. } => self.cnt_logs += 1,
            EnumProgressEvent::ColumnStarted { .. } => self.cnt_columns_started += 1,
            EnumProgressEvent::UnitCompleted { cnt_done_total, .. } => {
                self.cnt_units_completed = *cnt_done_total as u64;
            }
            EnumProgressEvent::Failed { message } => {
                self.failure = Some(message.clone());
                self.if_terminated = true;
            }
            EnumProgressEvent::Finished { cancelled } => {
                self.if_cancelled = *cancelled;
                self.if_terminated = true;
            }
        }
    }

    /// Whether a terminal event has been observed.
    pub fn is_terminated(&self) -> bool {
        self.if_terminated
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportSplit {
        ReportSplit {
            cnt_columns_started: self.cnt_columns_started,
            cnt_units_total: self.cnt_units_total,
            cnt_units_completed: self.cnt_units_completed,
            cnt_logs: self.cnt_logs,
            if_cancelled: self.if_cancelled,
            failure: self.failure,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_completed_events() -> Vec<EnumProgressEvent> {
        let c_col = "Region".to_string();
        vec![
            EnumProgressEvent::ColumnStarted {
                column: c_col.clone(),
                cnt_units: 2,
            },
            EnumProgressEvent::UnitCompleted {
                column: c_col.clone(),
                cnt_done_column: 1,
                cnt_done_total: 1,
            },
            EnumProgressEvent::Log {
                message: "Wrote 2 row(s) to North.xlsx".to_string(),
            },
            EnumProgressEvent::UnitCompleted {
                column: c_col,
                cnt_done_column: 2,
                cnt_done_total: 2,
            },
            EnumProgressEvent::Log {
                message: "Wrote 1 row(s) to South.xlsx".to_string(),
            },
            EnumProgressEvent::Finished { cancelled: false },
        ]
    }

    #[test]
    fn test_report_split_to_dict_and_format() {
        let mut builder = ReportSplitBuilder::new(2);
        for event in &create_completed_events() {
            builder.observe(event);
        }
        assert!(builder.is_terminated());
        let report = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_columns_started"], 1);
        assert_eq!(dict_counts["cnt_units_completed"], 2);
        assert_eq!(dict_counts["cnt_logs"], 2);
        assert_eq!(
            report.format("[SPLIT]"),
            "[SPLIT] columns=1 units=2/2 logs=2 warnings=0 cancelled=false failed=false"
        );
        assert_eq!(report.to_string(), report.format("[SPLIT]"));
    }

    #[test]
    fn test_report_split_records_failure() {
        let mut builder = ReportSplitBuilder::new(3);
        builder.observe(&EnumProgressEvent::Failed {
            message: "Failed to create directory out/Region".to_string(),
        });
        let report = builder.build();

        assert!(report.is_failed());
        assert!(!report.if_cancelled);
        assert_eq!(report.cnt_units_completed, 0);
        assert!(report.format("[SPLIT]").ends_with("failed=true"));
    }

    #[test]
    fn test_report_split_warns_on_event_after_terminal() {
        let mut builder = ReportSplitBuilder::new(0);
        builder.observe(&EnumProgressEvent::Finished { cancelled: true });
        builder.observe(&EnumProgressEvent::Log {
            message: "late".to_string(),
        });
        let report = builder.build();

        assert!(report.if_cancelled);
        assert_eq!(report.cnt_logs, 0);
        assert_eq!(report.warning_count(), 1);
    }
}
