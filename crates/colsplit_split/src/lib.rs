//! `colsplit_split` v1:
//! Column splitter engine: partition planning and the split worker.
//!
//! Modules:
//! - `spec`     : plan models, events, cancellation token and errors
//! - `sanitize` : filesystem-safe names and collision handling
//! - `plan`     : selected columns -> distinct values and unit totals
//! - `worker`   : plan execution with progress events
//! - `job`      : background worker thread and event channel
//! - `session`  : loaded table plus active job
//! - `report`   : consumer-side run report

pub mod job;
pub mod plan;
pub mod report;
pub mod sanitize;
pub mod session;
pub mod spec;
pub mod worker;

#[cfg(test)]
mod test_util;

pub use job::{SplitJobHandle, spawn_split_job};
pub use plan::build_plan;
pub use report::{ReportSplit, ReportSplitBuilder};
pub use sanitize::{NameAllocator, sanitize_path_component};
pub use session::SplitSession;
pub use spec::{
    EnumNameCollisionStrategy, EnumProgressEvent, EnumSplitOutcome, SpecSplitColumn,
    SpecSplitOptions, SpecSplitPlan, SplitCancelToken, SplitJobError, SplitPlanError,
    SplitSessionError, SplitWorkerError,
};
pub use worker::run_split;
