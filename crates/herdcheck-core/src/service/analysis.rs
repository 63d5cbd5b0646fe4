//! Full-pass orchestrator: lock, touch phase, sweep, terminal status.
//!
//! Control flow per pass:
//! 1. Acquire the pass lock (at most one pass in flight per dataset).
//! 2. Create the run and mint one fresh operation id for the whole pass.
//! 3. Stream records through the pipeline; `record` every detection with
//!    that operation id; update progress periodically.
//! 4. Only after every record has been visited, run the reconciliation
//!    sweep with the *same* operation id.
//! 5. Mark the run `Completed` with the summary counters.
//!
//! On any failure or cancellation mid-pass the run is marked `Failed` and
//! the sweep is skipped: partially-stamped state would incorrectly close
//! unvisited-but-still-valid issues. The lock guard releases on drop on
//! every path.

#![forbid(unsafe_code)]

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    coordination::locks::{LockError, PassLock},
    domain::{
        identifiers::{Cph, CtsLid, OperationId, RunId},
        run::ProgressUpdate,
    },
    pipeline::{AnalysisContext, RuleError, RulePipeline},
    service::{
        issues::{IssueCommandService, RecordIdentity, RecordOutcome, ServiceError},
        runs::{RunTracker, RunTrackerError},
    },
};

/// Name of the pass lock; one dataset, one lock.
const PASS_LOCK_NAME: &str = "herdcheck-analysis";

/// Lock time-to-live; generous enough for a full registry pass.
const PASS_LOCK_TTL: Duration = Duration::from_secs(60 * 60);

/// Progress is persisted every this many records.
const PROGRESS_STRIDE: u64 = 100;

/// Input record contract: the orchestrator only needs the identity parts.
pub trait AnalysisInput {
    /// Full CTS lifetime identifier of the record.
    fn cts_lid(&self) -> &CtsLid;
    /// County Parish Holding number of the record.
    fn cph(&self) -> &Cph;
}

/// Cooperative cancellation checked between per-record `record` calls.
#[derive(Debug, Default, Clone)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// New, not-cancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the in-flight pass.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors aborting a pass.
#[derive(Debug, Error)]
pub enum PassError {
    /// Another pass holds the lock.
    #[error("an analysis pass is already in progress")]
    PassInProgress,

    /// The pass was cancelled before the sweep; the run is marked failed.
    #[error("analysis cancelled")]
    Cancelled,

    /// A rule failed mid-pass; the run is marked failed, the sweep skipped.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Issue-side failure.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Run-tracking failure.
    #[error(transparent)]
    Tracker(#[from] RunTrackerError),

    /// Lock request was invalid.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Caller-visible summary of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// The run this pass was tracked under.
    pub run_id: RunId,
    /// The operation id stamped on every touched issue.
    pub operation_id: OperationId,
    /// Records visited.
    pub records_analyzed: u64,
    /// Issues newly created.
    pub issues_created: u64,
    /// Inactive issues reactivated.
    pub issues_reactivated: u64,
    /// Active issues re-stamped.
    pub issues_touched: u64,
    /// Issues closed by the reconciliation sweep.
    pub issues_swept: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl PassSummary {
    /// Created + reactivated + touched.
    #[must_use]
    pub const fn issues_found(&self) -> u64 {
        self.issues_created + self.issues_reactivated + self.issues_touched
    }
}

/// Drives the pipeline over a record stream and owns the pass lifecycle.
pub struct AnalysisPass<R> {
    pipeline: RulePipeline<R>,
    issues: IssueCommandService,
    runs: RunTracker,
    lock: Arc<dyn PassLock>,
}

impl<R: AnalysisInput> AnalysisPass<R> {
    /// Wire the orchestrator to its collaborators.
    #[must_use]
    pub fn new(
        pipeline: RulePipeline<R>,
        issues: IssueCommandService,
        runs: RunTracker,
        lock: Arc<dyn PassLock>,
    ) -> Self {
        Self {
            pipeline,
            issues,
            runs,
            lock,
        }
    }

    /// Execute one end-to-end pass over the given records.
    ///
    /// # Errors
    ///
    /// `PassError::PassInProgress` when the lock is held elsewhere. Any
    /// failure once the run exists marks it `Failed` and is returned;
    /// failures before or during the touch phase additionally skip the
    /// sweep.
    pub async fn execute(
        &self,
        records: &[R],
        cancel: &CancellationFlag,
    ) -> Result<PassSummary, PassError> {
        let _guard = self
            .lock
            .try_acquire(PASS_LOCK_NAME, PASS_LOCK_TTL)
            .await?
            .ok_or(PassError::PassInProgress)?;

        let started = Instant::now();
        let run = self.runs.create_run(records.len() as u64).await?;
        let operation_id = OperationId::generate();
        info!(run = %run.id, operation = %operation_id, records = records.len(), "pass started");

        match self
            .drive(records, &run.id, &operation_id, cancel, started)
            .await
        {
            Ok(summary) => Ok(summary),
            Err(error) => {
                // Every failure once the run exists lands it in a terminal
                // status, including sweep and completion write failures.
                let duration_ms = elapsed_ms(started);
                if let Err(fail_error) = self
                    .runs
                    .fail(&run.id, error.to_string(), duration_ms)
                    .await
                {
                    warn!(run = %run.id, error = %fail_error, "could not mark run failed");
                }
                Err(error)
            }
        }
    }

    /// Touch phase, then sweep, then completion. An error anywhere leaves
    /// the remaining steps undone (an incomplete touch phase must never
    /// sweep) and is turned into a `Failed` run by the caller.
    async fn drive(
        &self,
        records: &[R],
        run_id: &RunId,
        operation_id: &OperationId,
        cancel: &CancellationFlag,
        started: Instant,
    ) -> Result<PassSummary, PassError> {
        let counters = self
            .touch_phase(records, run_id, operation_id, cancel)
            .await?;
        let swept = self.issues.deactivate_stale(operation_id).await?;
        let duration_ms = elapsed_ms(started);
        let summary = PassSummary {
            run_id: run_id.clone(),
            operation_id: operation_id.clone(),
            records_analyzed: counters.records,
            issues_created: counters.created,
            issues_reactivated: counters.reactivated,
            issues_touched: counters.touched,
            issues_swept: swept,
            duration_ms,
        };
        self.runs
            .complete(
                run_id,
                summary.records_analyzed,
                summary.issues_found(),
                summary.issues_swept,
                duration_ms,
            )
            .await?;
        Ok(summary)
    }

    async fn touch_phase(
        &self,
        records: &[R],
        run_id: &RunId,
        operation_id: &OperationId,
        cancel: &CancellationFlag,
    ) -> Result<TouchCounters, PassError> {
        let total = records.len() as u64;
        let mut counters = TouchCounters::default();

        for record in records {
            if cancel.is_cancelled() {
                return Err(PassError::Cancelled);
            }

            let ctx = AnalysisContext::new(operation_id.clone());
            let results = self.pipeline.execute(record, &ctx)?;

            for pipeline_result in &results {
                let Some(detection) = pipeline_result.result.detection() else {
                    continue;
                };
                let identity = RecordIdentity {
                    cts_lid: record.cts_lid().clone(),
                    cph: record.cph().clone(),
                    rule_code: pipeline_result.rule_code.clone(),
                };
                match self.issues.record(operation_id, &identity, detection).await? {
                    RecordOutcome::Created => counters.created += 1,
                    RecordOutcome::Reactivated => counters.reactivated += 1,
                    RecordOutcome::Touched => counters.touched += 1,
                }
            }

            counters.records += 1;
            if counters.records % PROGRESS_STRIDE == 0 {
                self.runs
                    .update_progress(run_id, progress(&counters, total))
                    .await?;
            }
        }

        Ok(counters)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TouchCounters {
    records: u64,
    created: u64,
    reactivated: u64,
    touched: u64,
}

impl TouchCounters {
    const fn found(self) -> u64 {
        self.created + self.reactivated + self.touched
    }
}

fn progress(counters: &TouchCounters, total: u64) -> ProgressUpdate {
    let percentage = if total == 0 {
        100
    } else {
        // Counters never exceed total, so this stays within 0..=100.
        u8::try_from(counters.records * 100 / total).unwrap_or(100)
    };
    ProgressUpdate {
        percentage,
        description: format!("analyzed {} of {total} records", counters.records),
        records_analyzed: counters.records,
        issues_found: counters.found(),
        issues_resolved: 0,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
