//! Cooperative event consumer: drain, render, sleep, repeat.

use std::io::Write;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use colsplit_split::{
    EnumProgressEvent, EnumSplitOutcome, ReportSplit, ReportSplitBuilder, SplitJobHandle,
};
use tracing::{debug, warn};

/// Rendering of progress events on the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumEventFormat {
    /// One human-readable line per event.
    Human,
    /// One JSON object per line.
    Json,
}

/// Render one event as a single line (no trailing newline).
pub fn render_event(
    event: &EnumProgressEvent,
    rule_format: EnumEventFormat,
    cnt_units_total: usize,
) -> anyhow::Result<String> {
    if rule_format == EnumEventFormat::Json {
        return serde_json::to_string(event).context("Failed to serialize progress event");
    }
    let c_line = match event {
        EnumProgressEvent::Log { message } => message.clone(),
        EnumProgressEvent::ColumnStarted { column, cnt_units } => {
            format!("Column {column:?}: {cnt_units} file(s) to write")
        }
        EnumProgressEvent::UnitCompleted {
            column,
            cnt_done_column,
            cnt_done_total,
        } => format!("[{cnt_done_total}/{cnt_units_total}] {column}: {cnt_done_column} done"),
        EnumProgressEvent::Failed { message } => format!("Failed: {message}"),
        EnumProgressEvent::Finished { cancelled: false } => "Finished.".to_string(),
        EnumProgressEvent::Finished { cancelled: true } => "Cancelled.".to_string(),
    };
    Ok(c_line)
}

/// Poll `job` until its terminal event, writing every event to `out`.
///
/// Each pass drains all queued events without blocking, then sleeps
/// `interval_poll`. If the worker exits without a terminal event (panic),
/// the join outcome is folded in as a failure.
pub fn consume_job<W: Write>(
    job: &mut SplitJobHandle,
    rule_format: EnumEventFormat,
    interval_poll: Duration,
    out: &mut W,
) -> anyhow::Result<ReportSplit> {
    let cnt_units_total = job.cnt_units_total();
    let mut builder = ReportSplitBuilder::new(cnt_units_total);

    loop {
        // Sample before draining so events sent just before exit are not missed.
        let if_worker_done = job.is_finished();
        for event in job.drain_events() {
            builder.observe(&event);
            writeln!(out, "{}", render_event(&event, rule_format, cnt_units_total)?)
                .context("Failed to write progress output")?;
        }
        if builder.is_terminated() {
            break;
        }
        if if_worker_done {
            if let EnumSplitOutcome::Failed(err) = job.join() {
                let event = EnumProgressEvent::Failed {
                    message: err.to_string(),
                };
                builder.observe(&event);
                writeln!(out, "{}", render_event(&event, rule_format, cnt_units_total)?)
                    .context("Failed to write progress output")?;
            } else {
                builder.add_warning("Worker exited without a terminal event.".to_string());
                warn!("split worker exited without a terminal event");
            }
            break;
        }
        thread::sleep(interval_poll);
    }

    let outcome = job.join();
    debug!(?outcome, "split job joined");
    out.flush().context("Failed to flush progress output")?;
    Ok(builder.build())
}
