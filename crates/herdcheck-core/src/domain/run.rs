//! AnalysisRun aggregate: lifecycle of one end-to-end analysis pass.
//!
//! State machine: `Running -> Completed` or `Running -> Failed`, both
//! terminal. Progress updates are only valid while `Running`; report
//! artifact references may be attached at any point, including after a
//! terminal status (post-hoc report delivery).

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::domain::identifiers::RunId;

/// Errors for run state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    /// Progress or terminal transition attempted on an already-terminal run.
    #[error("run {run_id} is already terminal ({status})")]
    AlreadyTerminal { run_id: RunId, status: RunStatus },

    /// Progress percentage outside 0..=100.
    #[error("invalid progress percentage: {0}")]
    InvalidProgress(u8),
}

/// Terminal-checked run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum RunStatus {
    /// Pass in flight.
    Running,
    /// Pass finished; touch phase and sweep both applied.
    Completed,
    /// Pass aborted; the sweep did not run for this operation id.
    Failed,
}

impl RunStatus {
    /// Whether this status admits no further lifecycle transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Counter snapshot applied by progress updates. Values overwrite, they do
/// not accumulate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Percentage of the input set visited, 0..=100.
    pub percentage: u8,
    /// Human-readable phase description.
    pub description: String,
    /// Records visited so far.
    pub records_analyzed: u64,
    /// Issues found so far (created + reactivated + touched).
    pub issues_found: u64,
    /// Issues closed so far.
    pub issues_resolved: u64,
}

/// One analysis pass, tracked from start to terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRun {
    /// Run identity.
    pub id: RunId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Percentage of the input set visited, 0..=100.
    pub progress_percentage: u8,
    /// Human-readable phase description.
    pub status_description: Option<String>,
    /// Records visited.
    pub records_analyzed: u64,
    /// Total records in the input set, when known.
    pub total_records: u64,
    /// Issues found by the pass.
    pub issues_found: u64,
    /// Issues closed by the pass (manual closes plus the sweep).
    pub issues_resolved: u64,
    /// Captured failure message for `Failed` runs.
    pub error: Option<String>,
    /// Wall-clock duration of the pass in milliseconds.
    pub duration_ms: Option<u64>,
    /// Export artifact path, attached post-hoc.
    pub report_path: Option<String>,
    /// Export artifact URL, attached post-hoc.
    pub report_url: Option<String>,
}

impl AnalysisRun {
    /// Start a new run in `Running` state with zeroed counters.
    #[must_use]
    pub fn start(id: RunId, total_records: u64) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            progress_percentage: 0,
            status_description: None,
            records_analyzed: 0,
            total_records,
            issues_found: 0,
            issues_resolved: 0,
            error: None,
            duration_ms: None,
            report_path: None,
            report_url: None,
        }
    }

    fn ensure_running(&self) -> Result<(), RunError> {
        if self.status.is_terminal() {
            return Err(RunError::AlreadyTerminal {
                run_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Overwrite progress counters and description.
    ///
    /// # Errors
    ///
    /// Returns `RunError::AlreadyTerminal` once the run is `Completed` or
    /// `Failed`, and `RunError::InvalidProgress` for percentages above 100.
    pub fn update_progress(&mut self, update: ProgressUpdate) -> Result<(), RunError> {
        self.ensure_running()?;
        if update.percentage > 100 {
            return Err(RunError::InvalidProgress(update.percentage));
        }

        self.progress_percentage = update.percentage;
        self.status_description = Some(update.description);
        self.records_analyzed = update.records_analyzed;
        self.issues_found = update.issues_found;
        self.issues_resolved = update.issues_resolved;
        Ok(())
    }

    /// Transition to `Completed` with final counters.
    ///
    /// # Errors
    ///
    /// Returns `RunError::AlreadyTerminal` if the run already ended.
    pub fn complete(
        &mut self,
        records_analyzed: u64,
        issues_found: u64,
        issues_resolved: u64,
        duration_ms: u64,
    ) -> Result<(), RunError> {
        self.ensure_running()?;

        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.progress_percentage = 100;
        self.records_analyzed = records_analyzed;
        self.issues_found = issues_found;
        self.issues_resolved = issues_resolved;
        self.duration_ms = Some(duration_ms);
        Ok(())
    }

    /// Transition to `Failed` with the captured error.
    ///
    /// # Errors
    ///
    /// Returns `RunError::AlreadyTerminal` if the run already ended.
    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) -> Result<(), RunError> {
        self.ensure_running()?;

        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.duration_ms = Some(duration_ms);
        Ok(())
    }

    /// Attach report artifact references. Permitted at any point, including
    /// after a terminal status.
    pub fn set_report_details(&mut self, path: Option<String>, url: Option<String>) {
        self.report_path = path;
        self.report_url = url;
    }

    /// Replace the report URL only. Permitted post-terminally.
    pub fn update_report_url(&mut self, url: impl Into<String>) {
        self.report_url = Some(url.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_run() -> AnalysisRun {
        AnalysisRun::start(RunId::generate(), 500)
    }

    fn update(pct: u8) -> ProgressUpdate {
        ProgressUpdate {
            percentage: pct,
            description: "analyzing".to_string(),
            records_analyzed: u64::from(pct) * 5,
            issues_found: 3,
            issues_resolved: 0,
        }
    }

    #[test]
    fn progress_overwrites_counters() {
        let mut run = running_run();

        run.update_progress(update(10)).expect("running run");
        run.update_progress(update(40)).expect("running run");

        assert_eq!(run.progress_percentage, 40);
        assert_eq!(run.records_analyzed, 200);
        assert_eq!(run.status_description.as_deref(), Some("analyzing"));
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn progress_rejects_out_of_range() {
        let mut run = running_run();
        assert!(matches!(
            run.update_progress(update(101)),
            Err(RunError::InvalidProgress(101))
        ));
    }

    #[test]
    fn complete_is_terminal() {
        let mut run = running_run();
        run.complete(500, 12, 4, 1_234).expect("running run");

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.duration_ms, Some(1_234));
        assert_eq!(run.progress_percentage, 100);

        assert!(matches!(
            run.update_progress(update(50)),
            Err(RunError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            run.fail("late failure", 10),
            Err(RunError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn fail_captures_error() {
        let mut run = running_run();
        run.fail("registry unreachable", 800).expect("running run");

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("registry unreachable"));
        assert!(run.completed_at.is_some());
        assert!(matches!(
            run.complete(1, 1, 1, 1),
            Err(RunError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn report_details_allowed_after_terminal() {
        let mut run = running_run();
        run.complete(500, 12, 4, 1_234).expect("running run");

        run.set_report_details(Some("reports/run.zip".to_string()), None);
        run.update_report_url("https://reports.example/run.zip");

        assert_eq!(run.report_path.as_deref(), Some("reports/run.zip"));
        assert_eq!(
            run.report_url.as_deref(),
            Some("https://reports.example/run.zip")
        );
    }
}
