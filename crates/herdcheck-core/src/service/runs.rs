//! Run tracker: exclusive owner of writes to `AnalysisRun` documents.

#![forbid(unsafe_code)]

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::{
    identifiers::RunId,
    repository::{AnalysisRunRepository, RepositoryError},
    run::{AnalysisRun, ProgressUpdate, RunError},
};

/// Errors from run tracker operations.
#[derive(Debug, Error)]
pub enum RunTrackerError {
    /// Operation targeted a run id that does not exist.
    #[error("analysis run not found: {0}")]
    RunNotFound(RunId),

    /// Invalid lifecycle transition (terminal run, bad percentage).
    #[error(transparent)]
    Run(#[from] RunError),

    /// Store failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Sequences and observes one analysis pass via the run repository.
#[derive(Clone)]
pub struct RunTracker {
    runs: Arc<dyn AnalysisRunRepository>,
}

impl RunTracker {
    /// Wire the tracker to its repository.
    #[must_use]
    pub fn new(runs: Arc<dyn AnalysisRunRepository>) -> Self {
        Self { runs }
    }

    /// Allocate a new run in `Running` state with zeroed counters.
    pub async fn create_run(&self, total_records: u64) -> Result<AnalysisRun, RunTrackerError> {
        let run = AnalysisRun::start(RunId::generate(), total_records);
        self.runs.create(&run).await?;
        info!(run = %run.id, total_records, "analysis run started");
        Ok(run)
    }

    /// Fetch a run by id.
    pub async fn get(&self, run_id: &RunId) -> Result<AnalysisRun, RunTrackerError> {
        self.runs
            .get(run_id)
            .await?
            .ok_or_else(|| RunTrackerError::RunNotFound(run_id.clone()))
    }

    /// Overwrite the run's progress counters. Valid only while `Running`.
    pub async fn update_progress(
        &self,
        run_id: &RunId,
        update: ProgressUpdate,
    ) -> Result<(), RunTrackerError> {
        self.with_run(run_id, |run| run.update_progress(update)).await
    }

    /// Transition the run to `Completed` with final counters.
    pub async fn complete(
        &self,
        run_id: &RunId,
        records_analyzed: u64,
        issues_found: u64,
        issues_resolved: u64,
        duration_ms: u64,
    ) -> Result<(), RunTrackerError> {
        self.with_run(run_id, |run| {
            run.complete(records_analyzed, issues_found, issues_resolved, duration_ms)
        })
        .await?;
        info!(run = %run_id, records_analyzed, issues_found, issues_resolved, "analysis run completed");
        Ok(())
    }

    /// Transition the run to `Failed` with the captured error.
    pub async fn fail(
        &self,
        run_id: &RunId,
        error: impl Into<String> + Send,
        duration_ms: u64,
    ) -> Result<(), RunTrackerError> {
        let message = error.into();
        info!(run = %run_id, error = %message, "analysis run failed");
        self.with_run(run_id, move |run| run.fail(message, duration_ms))
            .await
    }

    /// Attach report artifact references. Permitted post-terminally.
    pub async fn set_report_details(
        &self,
        run_id: &RunId,
        path: Option<String>,
        url: Option<String>,
    ) -> Result<(), RunTrackerError> {
        self.with_run(run_id, |run| {
            run.set_report_details(path, url);
            Ok(())
        })
        .await
    }

    /// Replace the report URL. Permitted post-terminally.
    pub async fn update_report_url(
        &self,
        run_id: &RunId,
        url: impl Into<String> + Send,
    ) -> Result<(), RunTrackerError> {
        let url = url.into();
        self.with_run(run_id, move |run| {
            run.update_report_url(url);
            Ok(())
        })
        .await
    }

    /// Load, transition, persist. Not-found is fatal to the command.
    async fn with_run(
        &self,
        run_id: &RunId,
        transition: impl FnOnce(&mut AnalysisRun) -> Result<(), RunError> + Send,
    ) -> Result<(), RunTrackerError> {
        let mut run = self
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| RunTrackerError::RunNotFound(run_id.clone()))?;

        transition(&mut run)?;
        self.runs.update(&run).await?;
        Ok(())
    }
}
