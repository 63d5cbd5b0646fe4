//! # Service Layer
//!
//! Orchestration over the domain aggregates and repository seams:
//!
//! - [`issues`] - `IssueCommandService`: single-issue operations, the
//!   `record` idempotent upsert, and the reconciliation sweep. Exclusive
//!   owner of issue/history writes.
//! - [`runs`] - `RunTracker`: exclusive owner of `AnalysisRun` writes.
//! - [`analysis`] - `AnalysisPass`: the end-to-end pass (lock, touch phase,
//!   sweep, terminal status, cancellation).

#![forbid(unsafe_code)]

pub mod analysis;
pub mod issues;
pub mod runs;

pub use analysis::{AnalysisInput, AnalysisPass, CancellationFlag, PassError, PassSummary};
pub use issues::{
    IssueCommandService, PurgeSummary, RecordIdentity, RecordOutcome, ServiceError,
};
pub use runs::{RunTracker, RunTrackerError};
