//! # Domain Layer
//!
//! Core business logic of the issue lifecycle engine, independent of any
//! store or transport. Follows the functional-core pattern: aggregates are
//! pure state machines; every transition method returns the single
//! [`history::IssueHistoryEntry`] it implies, and the service layer persists
//! state and entry together.
//!
//! ## Module Structure
//!
//! - [`identifiers`] - semantic newtypes (parse once at the boundary)
//! - [`issue`] - Issue aggregate root and its state machine
//! - [`history`] - append-only audit entries and the `IssueAction` enum
//! - [`run`] - AnalysisRun aggregate with terminal status handling
//! - [`repository`] - persistence trait seams and the error taxonomy
//!
//! ## Design Principles
//!
//! - Parse at boundaries, validate once: raw strings become identifiers
//!   exactly once, at construction.
//! - Make illegal states unrepresentable: closed enums for actions and
//!   statuses, exhaustively matched in transition logic.
//! - `is_active`, `is_ignored` and `resolution_status` are independent axes;
//!   no transition couples them.

#![forbid(unsafe_code)]

pub mod history;
pub mod identifiers;
pub mod issue;
pub mod repository;
pub mod run;

pub use history::{IssueAction, IssueHistoryEntry};
pub use identifiers::{
    Actor, Cph, CtsLid, HistoryEntryId, IdError, IssueCode, IssueId, OperationId, RuleCode, RunId,
};
pub use issue::{ContactDetails, Issue, IssueDescriptor, ResolutionStatus};
pub use repository::{
    AnalysisRunRepository, IssueHistoryRepository, IssueRepository, RepositoryError,
    RepositoryResult,
};
pub use run::{AnalysisRun, ProgressUpdate, RunError, RunStatus};
