//! Repository trait interfaces for persistence abstraction.
//!
//! Business logic depends on these traits, never on a concrete store. The
//! in-memory implementation backs unit tests and the single-node CLI; the
//! sqlite implementation is the durable store. Traits use domain types, not
//! primitives, and every method returns a `Result`.
//!
//! Concurrency contract: `record`-path operations against *different* issue
//! identities are independent; operations against the *same* identity are
//! read-modify-write and must be serialized by the store (atomic upsert).
//! `deactivate_stale` must apply its filter-and-update atomically.

#![forbid(unsafe_code)]

use async_trait::async_trait;

use crate::domain::{
    history::IssueHistoryEntry,
    identifiers::{IssueCode, IssueId, OperationId, RunId},
    issue::Issue,
    run::AnalysisRun,
};

// ============================================================================
// SHARED ERROR TYPES
// ============================================================================

/// Common errors across all repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Entity not found in repository.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// Conflict with existing data (duplicate id, constraint violation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid input for a store operation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} '{id}'"))
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage(reason.into())
    }
}

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

// ============================================================================
// ISSUE REPOSITORY
// ============================================================================

/// Persistence for the Issue aggregate, keyed by the deterministic
/// thumbprint.
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Load an issue by id. `Ok(None)` when absent; absence is informational
    /// here, the service layer decides whether it is an error.
    async fn get(&self, id: &IssueId) -> RepositoryResult<Option<Issue>>;

    /// Insert or replace an issue atomically.
    async fn upsert(&self, issue: &Issue) -> RepositoryResult<()>;

    /// All active issues, sorted by CPH (the report-export access path).
    async fn list_active(&self) -> RepositoryResult<Vec<Issue>>;

    /// Issues matching an issue code, optionally restricted to active ones,
    /// sorted by CPH.
    async fn find_by_code(
        &self,
        code: &IssueCode,
        active_only: bool,
    ) -> RepositoryResult<Vec<Issue>>;

    /// Atomically deactivate every active issue whose operation stamp is not
    /// `current`, returning the ids that transitioned. The whole
    /// filter-and-update must be one atomic step with no intermediate
    /// observable state.
    async fn deactivate_stale(&self, current: &OperationId) -> RepositoryResult<Vec<IssueId>>;

    /// Administrative purge. Returns the number of issues removed.
    async fn delete_all(&self) -> RepositoryResult<u64>;
}

// ============================================================================
// ISSUE HISTORY REPOSITORY
// ============================================================================

/// Append-only persistence for issue history entries.
#[async_trait]
pub trait IssueHistoryRepository: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: &IssueHistoryEntry) -> RepositoryResult<()>;

    /// Append many entries in one call (used by the reconciliation sweep).
    async fn append_batch(&self, entries: &[IssueHistoryEntry]) -> RepositoryResult<()>;

    /// All entries for one issue, ordered by occurrence time.
    async fn list_for_issue(&self, issue_id: &IssueId) -> RepositoryResult<Vec<IssueHistoryEntry>>;

    /// Administrative purge. Returns the number of entries removed.
    async fn delete_all(&self) -> RepositoryResult<u64>;
}

// ============================================================================
// ANALYSIS RUN REPOSITORY
// ============================================================================

/// Persistence for `AnalysisRun` documents.
#[async_trait]
pub trait AnalysisRunRepository: Send + Sync {
    /// Create a new run.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the run id already exists.
    async fn create(&self, run: &AnalysisRun) -> RepositoryResult<()>;

    /// Load a run by id. `Ok(None)` when absent.
    async fn get(&self, id: &RunId) -> RepositoryResult<Option<AnalysisRun>>;

    /// Replace an existing run.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the run does not exist.
    async fn update(&self, run: &AnalysisRun) -> RepositoryResult<()>;
}
