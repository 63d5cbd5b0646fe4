//! # herdcheck-core
//!
//! Engine for durable, auditable data-quality issue tracking over livestock
//! registry records. A pass streams records through an ordered,
//! short-circuiting rule pipeline; detections become idempotent state
//! transitions on long-lived Issue aggregates (keyed by a deterministic
//! thumbprint); a reconciliation sweep then closes every issue the pass no
//! longer detected; and an `AnalysisRun` tracks the whole pass to a terminal
//! status. Every transition leaves exactly one append-only history entry.
//!
//! ## Layers
//!
//! - [`domain`] - aggregates, identifiers, history, repository seams
//! - [`identity`] - deterministic issue thumbprints
//! - [`pipeline`] - the rule pipeline and its builder
//! - [`coordination`] - pass-level mutual exclusion
//! - [`service`] - issue commands, run tracking, the pass orchestrator
//! - [`store`] - in-memory and sqlite repository implementations
//!
//! ## Example
//!
//! ```rust,ignore
//! let issues = IssueCommandService::new(issue_repo, history_repo);
//! let runs = RunTracker::new(run_repo);
//! let pass = AnalysisPass::new(pipeline, issues, runs, lock);
//! let summary = pass.execute(&records, &CancellationFlag::new()).await?;
//! println!("{} stale issues closed", summary.issues_swept);
//! ```

#![forbid(unsafe_code)]

pub mod coordination;
pub mod domain;
pub mod identity;
pub mod pipeline;
pub mod service;
pub mod store;

pub use coordination::{InProcessLock, LockError, LockGuard, PassLock};
pub use domain::{
    Actor, AnalysisRun, ContactDetails, Cph, CtsLid, IdError, Issue, IssueAction, IssueCode,
    IssueDescriptor, IssueHistoryEntry, IssueId, OperationId, ProgressUpdate, RepositoryError,
    ResolutionStatus, RuleCode, RunError, RunId, RunStatus,
};
pub use identity::{thumbprint, IdentityError};
pub use pipeline::{
    AnalysisContext, ContinuationPolicy, IssueDetection, PipelineRuleResult, Rule, RuleError,
    RulePipeline, RulePipelineBuilder, RuleResult,
};
pub use service::{
    AnalysisInput, AnalysisPass, CancellationFlag, IssueCommandService, PassError, PassSummary,
    PurgeSummary, RecordIdentity, RecordOutcome, RunTracker, RunTrackerError, ServiceError,
};
pub use store::{
    InMemoryAnalysisRunRepository, InMemoryIssueHistoryRepository, InMemoryIssueRepository,
    SqliteStore,
};
