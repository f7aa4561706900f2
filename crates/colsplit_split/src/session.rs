//! Split session: the loaded table plus at most one active job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colsplit_io_xlsx::read_table;
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::job::{SplitJobHandle, spawn_split_job};
use crate::plan::build_plan;
use crate::spec::{SpecSplitOptions, SpecSplitPlan, SplitCancelToken, SplitSessionError};

/// Owns the current table and the running job, if any.
#[derive(Default)]
pub struct SplitSession {
    df: Option<Arc<DataFrame>>,
    path_file_table: Option<PathBuf>,
    cancel: SplitCancelToken,
    job: Option<SplitJobHandle>,
    options: SpecSplitOptions,
}

impl SplitSession {
    /// Empty session with the given worker options.
    pub fn new(options: SpecSplitOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Load `path` and make it the current table.
    ///
    /// On failure the previous table stays loaded. A running job keeps its
    /// own reference to the table it started with.
    pub fn load_table<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<Vec<String>, SplitSessionError> {
        let path_file_in = path.as_ref();
        let df = read_table(path_file_in)?;
        info!(
            path = %path_file_in.display(),
            rows = df.height(),
            columns = df.width(),
            "table loaded"
        );
        self.set_table(df, Some(path_file_in.to_path_buf()));
        Ok(self.columns())
    }

    /// Replace the current table with an in-memory one.
    pub fn set_table(&mut self, df: DataFrame, path_file_table: Option<PathBuf>) {
        self.df = Some(Arc::new(df));
        self.path_file_table = path_file_table;
    }

    /// Current table, if loaded.
    pub fn table(&self) -> Option<&DataFrame> {
        self.df.as_deref()
    }

    /// Source path of the current table.
    pub fn table_path(&self) -> Option<&Path> {
        self.path_file_table.as_deref()
    }

    /// Column names of the current table (empty if none is loaded).
    pub fn columns(&self) -> Vec<String> {
        self.df
            .as_ref()
            .map(|df| {
                df.get_column_names_str()
                    .into_iter()
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Plan a split of `selected` over the current table.
    pub fn build_plan<S: AsRef<str>>(
        &self,
        selected: &[S],
    ) -> Result<SpecSplitPlan, SplitSessionError> {
        let df = self.df.as_ref().ok_or(SplitSessionError::NoTableLoaded)?;
        Ok(build_plan(df, selected)?)
    }

    /// Plan and start a job writing under `path_dir_out`.
    ///
    /// A plan with zero units is rejected with `NothingToSplit` and no
    /// worker is started. The cancellation flag is reset first. Events the
    /// previous, finished job queued but nobody drained are written to the
    /// log and then dropped along with its handle.
    pub fn start_job<S: AsRef<str>>(
        &mut self,
        selected: &[S],
        path_dir_out: impl Into<PathBuf>,
    ) -> Result<&mut SplitJobHandle, SplitSessionError> {
        let df = self.df.clone().ok_or(SplitSessionError::NoTableLoaded)?;
        if self.job.as_ref().is_some_and(|job| !job.is_finished()) {
            return Err(SplitSessionError::JobAlreadyRunning);
        }

        let plan = build_plan(&df, selected)?;
        if plan.is_empty() {
            warn!(
                columns = plan.columns.len(),
                "nothing to split: selected columns have no values"
            );
            return Err(SplitSessionError::NothingToSplit);
        }

        self.cancel.reset();
        let handle = spawn_split_job(
            df,
            plan,
            path_dir_out.into(),
            self.cancel.clone(),
            self.options.clone(),
        )?;
        if let Some(job_prev) = self.job.take() {
            retire_job(job_prev);
        }
        Ok(self.job.insert(handle))
    }

    /// Most recently started job, running or finished.
    pub fn active_job(&mut self) -> Option<&mut SplitJobHandle> {
        self.job.as_mut()
    }

    /// Request cancellation of the running job. Returns `false` if there is
    /// no unfinished job.
    pub fn cancel_job(&self) -> bool {
        match &self.job {
            Some(job) if !job.is_finished() => {
                self.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}

/// Log and drop the undrained events of a finished job. Returns how many
/// were dropped.
fn retire_job(mut job: SplitJobHandle) -> usize {
    let l_events = job.drain_events();
    for event in &l_events {
        debug!(?event, "undrained event of previous job");
    }
    if !l_events.is_empty() {
        warn!(
            count = l_events.len(),
            "previous job had undrained events; dropping them"
        );
    }
    let outcome = job.join();
    debug!(?outcome, "previous job retired");
    l_events.len()
}
