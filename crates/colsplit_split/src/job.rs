//! Background split job: one worker thread, one ordered event channel.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use polars::prelude::DataFrame;
use tracing::{debug, error};

use crate::spec::{
    EnumProgressEvent, EnumSplitOutcome, SpecSplitOptions, SpecSplitPlan, SplitCancelToken,
    SplitJobError, SplitWorkerError,
};
use crate::worker::run_split;

/// Name of the worker thread.
pub const C_THREAD_NAME_WORKER: &str = "colsplit-split-worker";

pub type SplitEventTx = Sender<EnumProgressEvent>;
pub type SplitEventRx = Receiver<EnumProgressEvent>;

/// Handle to a running (or finished) split job.
///
/// The caller polls [`Self::drain_events`] and requests cancellation through
/// [`Self::cancel`]; the worker owns nothing the caller reads besides the
/// channel.
pub struct SplitJobHandle {
    rx_events: SplitEventRx,
    cancel: SplitCancelToken,
    cnt_units_total: usize,
    thread: Option<JoinHandle<EnumSplitOutcome>>,
    outcome: Option<EnumSplitOutcome>,
}

/// Start `plan` on a background thread.
///
/// `table` is shared read-only with the worker. `cancel` is observed between
/// units.
pub fn spawn_split_job(
    table: Arc<DataFrame>,
    plan: SpecSplitPlan,
    path_dir_out: PathBuf,
    cancel: SplitCancelToken,
    options: SpecSplitOptions,
) -> Result<SplitJobHandle, SplitJobError> {
    let (tx_events, rx_events): (SplitEventTx, SplitEventRx) = crossbeam_channel::unbounded();
    let cnt_units_total = plan.cnt_units_total;
    let cancel_worker = cancel.clone();

    debug!(
        units = cnt_units_total,
        columns = plan.columns.len(),
        path = %path_dir_out.display(),
        "spawning split job"
    );
    let thread = thread::Builder::new()
        .name(C_THREAD_NAME_WORKER.to_string())
        .spawn(move || {
            run_split(
                &table,
                &plan,
                &path_dir_out,
                &cancel_worker,
                &options,
                |event| {
                    // A dropped receiver means nobody is listening any more.
                    let _ = tx_events.send(event);
                },
            )
        })
        .map_err(|e| SplitJobError::SpawnFailed(e.to_string()))?;

    Ok(SplitJobHandle {
        rx_events,
        cancel,
        cnt_units_total,
        thread: Some(thread),
        outcome: None,
    })
}

impl SplitJobHandle {
    /// All events queued so far, without blocking.
    pub fn drain_events(&self) -> Vec<EnumProgressEvent> {
        self.rx_events.try_iter().collect()
    }

    /// Next event, waiting at most `timeout`.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<EnumProgressEvent> {
        self.rx_events.recv_timeout(timeout).ok()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancellation token shared with the worker.
    pub fn token(&self) -> &SplitCancelToken {
        &self.cancel
    }

    /// Units planned for this job.
    pub fn cnt_units_total(&self) -> usize {
        self.cnt_units_total
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the worker and return its outcome. Idempotent.
    ///
    /// A worker panic is reported as a failed outcome; in that case no
    /// terminal event was sent.
    pub fn join(&mut self) -> EnumSplitOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.thread.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(payload)) => {
                let message = derive_panic_message(payload.as_ref());
                error!("split worker panicked: {message}");
                EnumSplitOutcome::Failed(SplitWorkerError::Panicked(message))
            }
            None => EnumSplitOutcome::Failed(SplitWorkerError::Panicked(
                "worker thread handle missing".to_string(),
            )),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

fn derive_panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
