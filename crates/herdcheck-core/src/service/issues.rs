//! Issue command service: single-issue operations and the reconciliation
//! sweep.
//!
//! Exclusive owner of writes to issues and issue history. Every operation
//! loads current state, applies one aggregate transition, and persists the
//! new state together with the one history entry the transition returned.
//! `record` is the only operation that may create an issue; all others fail
//! with not-found on a missing id, and that failure is fatal to the single
//! command (never retried internally).

#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    domain::{
        history::IssueHistoryEntry,
        identifiers::{Actor, Cph, CtsLid, IssueId, OperationId, RuleCode},
        issue::{Issue, IssueDescriptor, ResolutionStatus},
        repository::{IssueHistoryRepository, IssueRepository, RepositoryError},
    },
    identity::{self, IdentityError},
    pipeline::IssueDetection,
};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// How a `record` call changed state. Returned so orchestrators can build a
/// run summary without re-querying the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RecordOutcome {
    /// A new issue was created.
    Created,
    /// An inactive issue was re-detected and re-opened.
    Reactivated,
    /// An active issue was re-stamped with the current operation id.
    Touched,
}

/// Counts removed by the administrative purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeSummary {
    /// Issues removed.
    pub issues_deleted: u64,
    /// History entries removed.
    pub history_deleted: u64,
}

/// The identity parts of the record/rule pair a detection belongs to.
///
/// The thumbprint is derived from `(cts_lid, rule_code)`, in that order;
/// the CPH rides along as a descriptive field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIdentity {
    /// Full CTS lifetime identifier of the analyzed record.
    pub cts_lid: CtsLid,
    /// County Parish Holding number of the analyzed record.
    pub cph: Cph,
    /// Code of the rule that produced the detection.
    pub rule_code: RuleCode,
}

/// Service-level errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Single-issue operation targeted a missing issue. Fatal to the
    /// command; the caller decides whether to create-then-retry.
    #[error("issue not found: {0}")]
    IssueNotFound(IssueId),

    /// Identity parts failed validation.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Store failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// ============================================================================
// ISSUE COMMAND SERVICE
// ============================================================================

/// Orchestrates issue state transitions and their audit entries over the
/// issue and history repositories.
#[derive(Clone)]
pub struct IssueCommandService {
    issues: Arc<dyn IssueRepository>,
    history: Arc<dyn IssueHistoryRepository>,
}

impl IssueCommandService {
    /// Wire the service to its repositories.
    #[must_use]
    pub fn new(issues: Arc<dyn IssueRepository>, history: Arc<dyn IssueHistoryRepository>) -> Self {
        Self { issues, history }
    }

    /// Resolve the deterministic issue id for a record/rule pair.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Identity` when a part is empty.
    pub fn issue_id_for(identity: &RecordIdentity) -> Result<IssueId, ServiceError> {
        Ok(identity::thumbprint(&[
            identity.cts_lid.as_str(),
            identity.rule_code.as_str(),
        ])?)
    }

    // ========================================================================
    // PASS-DRIVEN OPERATIONS
    // ========================================================================

    /// Record a rule detection: create, reactivate, or touch the issue for
    /// this (record, rule) identity, stamping it with the pass's operation
    /// id. Idempotent across passes thanks to the deterministic thumbprint.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Identity` for empty identity parts and
    /// propagates store failures.
    pub async fn record(
        &self,
        operation_id: &OperationId,
        identity: &RecordIdentity,
        detection: &IssueDetection,
    ) -> Result<RecordOutcome, ServiceError> {
        let id = Self::issue_id_for(identity)?;
        let descriptor = IssueDescriptor {
            cts_lid: identity.cts_lid.clone(),
            cph: identity.cph.clone(),
            issue_code: detection.issue_code.clone(),
            rule_code: identity.rule_code.clone(),
            error_code: detection.error_code.clone(),
            error_description: detection.error_description.clone(),
            contact: detection.contact.clone(),
        };

        let (issue, entry, outcome) = match self.issues.get(&id).await? {
            Some(mut issue) => {
                let was_active = issue.is_active;
                let entry = issue.record_detection(operation_id.clone(), descriptor);
                let outcome = if was_active {
                    RecordOutcome::Touched
                } else {
                    RecordOutcome::Reactivated
                };
                (issue, entry, outcome)
            }
            None => {
                let (issue, entry) = Issue::open(id, operation_id.clone(), descriptor);
                (issue, entry, RecordOutcome::Created)
            }
        };

        self.persist(&issue, &entry).await?;
        debug!(issue = %issue.id, %outcome, "recorded detection");
        Ok(outcome)
    }

    /// Close every active issue the given pass did not touch. Returns the
    /// number closed. Idempotent: issues deactivated by one sweep keep their
    /// old stamp, so a repeat sweep with the same operation id matches none
    /// of them again.
    ///
    /// Must only be called after the pass has touched every input record;
    /// a partial pass must skip the sweep entirely.
    pub async fn deactivate_stale(
        &self,
        operation_id: &OperationId,
    ) -> Result<u64, ServiceError> {
        let swept = self.issues.deactivate_stale(operation_id).await?;
        if !swept.is_empty() {
            let entries: Vec<IssueHistoryEntry> = swept
                .iter()
                .map(|issue_id| {
                    IssueHistoryEntry::new(
                        issue_id.clone(),
                        crate::domain::history::IssueAction::Deactivated,
                        Actor::system(),
                        Some(format!("not detected by operation {operation_id}")),
                    )
                })
                .collect();
            self.history.append_batch(&entries).await?;
        }
        info!(closed = swept.len(), operation = %operation_id, "reconciliation sweep");
        Ok(swept.len() as u64)
    }

    // ========================================================================
    // MANUAL OPERATIONS
    // ========================================================================

    /// Explicitly close an issue.
    pub async fn deactivate(
        &self,
        issue_id: &IssueId,
        performed_by: Actor,
    ) -> Result<(), ServiceError> {
        self.mutate(issue_id, |issue| issue.deactivate(performed_by, None))
            .await
    }

    /// Set the manual ignore flag.
    pub async fn ignore(&self, issue_id: &IssueId, performed_by: Actor) -> Result<(), ServiceError> {
        self.mutate(issue_id, |issue| issue.ignore(performed_by)).await
    }

    /// Clear the manual ignore flag.
    pub async fn unignore(
        &self,
        issue_id: &IssueId,
        performed_by: Actor,
    ) -> Result<(), ServiceError> {
        self.mutate(issue_id, |issue| issue.unignore(performed_by))
            .await
    }

    /// Change the manual workflow status.
    pub async fn update_resolution_status(
        &self,
        issue_id: &IssueId,
        status: ResolutionStatus,
        performed_by: Actor,
    ) -> Result<(), ServiceError> {
        self.mutate(issue_id, |issue| {
            issue.set_resolution_status(status, performed_by)
        })
        .await
    }

    /// Assign the issue to a person.
    pub async fn assign(
        &self,
        issue_id: &IssueId,
        assignee: Actor,
        performed_by: Actor,
    ) -> Result<(), ServiceError> {
        self.mutate(issue_id, |issue| issue.assign(assignee, performed_by))
            .await
    }

    /// Clear the issue's assignment.
    pub async fn unassign(
        &self,
        issue_id: &IssueId,
        performed_by: Actor,
    ) -> Result<(), ServiceError> {
        self.mutate(issue_id, |issue| issue.unassign(performed_by))
            .await
    }

    /// Administrative reset: delete all issues and history.
    pub async fn delete_all(&self) -> Result<PurgeSummary, ServiceError> {
        let issues_deleted = self.issues.delete_all().await?;
        let history_deleted = self.history.delete_all().await?;
        info!(issues_deleted, history_deleted, "administrative purge");
        Ok(PurgeSummary {
            issues_deleted,
            history_deleted,
        })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Load, apply one transition, persist state + entry. Not-found is fatal
    /// to the command and performs no write.
    async fn mutate(
        &self,
        issue_id: &IssueId,
        transition: impl FnOnce(&mut Issue) -> IssueHistoryEntry + Send,
    ) -> Result<(), ServiceError> {
        let mut issue = self
            .issues
            .get(issue_id)
            .await?
            .ok_or_else(|| ServiceError::IssueNotFound(issue_id.clone()))?;

        let entry = transition(&mut issue);
        self.persist(&issue, &entry).await?;
        debug!(issue = %issue.id, action = %entry.action, "issue transition");
        Ok(())
    }

    async fn persist(
        &self,
        issue: &Issue,
        entry: &IssueHistoryEntry,
    ) -> Result<(), ServiceError> {
        self.issues.upsert(issue).await?;
        self.history.append(entry).await?;
        Ok(())
    }
}
