//! Issue aggregate root with business rules and invariants.
//!
//! The Issue aggregate represents one (record, rule) data-quality finding:
//! - Deterministic identity (`IssueId` thumbprint), never regenerated
//! - Activity flag driven by rule passes and the reconciliation sweep
//! - Independent manual flags: ignore, resolution status, assignment
//! - Operation-id stamp acting as a logical clock for the sweep
//!
//! # Invariants
//!
//! 1. `is_active`, `is_ignored` and `resolution_status` are three independent
//!    axes; no transition on one touches another.
//! 2. `id` is immutable after creation.
//! 3. Every state mutation returns exactly one [`IssueHistoryEntry`]; the
//!    caller persists the new state and the entry together (aggregate with
//!    companion audit log).
//! 4. `last_updated_at` advances on every transition.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::{
    history::{IssueAction, IssueHistoryEntry},
    identifiers::{Actor, Cph, CtsLid, IssueCode, IssueId, OperationId, RuleCode},
};

// ============================================================================
// SUPPORTING VALUE TYPES
// ============================================================================

/// Manual workflow status, independent of the activity flag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum ResolutionStatus {
    /// No workflow status assigned yet.
    #[default]
    None,
    /// Queued for someone to pick up.
    Todo,
    /// Being worked on.
    InProgress,
    /// Resolved by a person (the underlying rule may still fire).
    Resolved,
}

/// Optional contact context captured from rule context data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactDetails {
    /// Contact email addresses for the holding.
    pub emails: Vec<String>,
    /// Contact phone numbers for the holding.
    pub phones: Vec<String>,
    /// Administrative region code, when known.
    pub region_code: Option<String>,
}

/// Descriptive fields fixed at creation and refreshed on every touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDescriptor {
    /// Full CTS lifetime identifier of the analyzed record.
    pub cts_lid: CtsLid,
    /// County Parish Holding number of the analyzed record.
    pub cph: Cph,
    /// Classification code of the detected issue.
    pub issue_code: IssueCode,
    /// Code of the rule that detected it.
    pub rule_code: RuleCode,
    /// Optional upstream error code.
    pub error_code: Option<String>,
    /// Optional upstream error description.
    pub error_description: Option<String>,
    /// Optional contact context for the holding.
    pub contact: Option<ContactDetails>,
}

// ============================================================================
// ISSUE AGGREGATE ROOT
// ============================================================================

/// One persisted data-quality finding tied to one source record and one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Deterministic thumbprint identity. Immutable after creation.
    pub id: IssueId,
    /// Identity of the most recent pass that asserted this issue holds.
    pub operation_id: OperationId,
    /// Full CTS lifetime identifier of the analyzed record.
    pub cts_lid: CtsLid,
    /// County Parish Holding number of the analyzed record.
    pub cph: Cph,
    /// Classification code of the detected issue.
    pub issue_code: IssueCode,
    /// Code of the rule that detected it.
    pub rule_code: RuleCode,
    /// Optional upstream error code.
    pub error_code: Option<String>,
    /// Optional upstream error description.
    pub error_description: Option<String>,
    /// Optional contact context for the holding.
    pub contact: Option<ContactDetails>,
    /// When the issue was first created.
    pub created_at: DateTime<Utc>,
    /// When the issue last transitioned.
    pub last_updated_at: DateTime<Utc>,
    /// True while the rule condition currently holds.
    pub is_active: bool,
    /// Independent manual flag; never implied by activity.
    pub is_ignored: bool,
    /// Independent manual workflow status.
    pub resolution_status: ResolutionStatus,
    /// Optional human owner.
    pub assigned_to: Option<Actor>,
}

impl Issue {
    // ========================================================================
    // CONSTRUCTORS
    // ========================================================================

    /// Open a new active issue and its `Created` history entry.
    ///
    /// The only path that creates an issue; all other operations require the
    /// issue to already exist.
    #[must_use]
    pub fn open(
        id: IssueId,
        operation_id: OperationId,
        descriptor: IssueDescriptor,
    ) -> (Self, IssueHistoryEntry) {
        let now = Utc::now();
        let issue = Self {
            id: id.clone(),
            operation_id,
            cts_lid: descriptor.cts_lid,
            cph: descriptor.cph,
            issue_code: descriptor.issue_code,
            rule_code: descriptor.rule_code,
            error_code: descriptor.error_code,
            error_description: descriptor.error_description,
            contact: descriptor.contact,
            created_at: now,
            last_updated_at: now,
            is_active: true,
            is_ignored: false,
            resolution_status: ResolutionStatus::None,
            assigned_to: None,
        };
        let entry = IssueHistoryEntry::new(id, IssueAction::Created, Actor::system(), None);
        (issue, entry)
    }

    // ========================================================================
    // PASS-DRIVEN TRANSITIONS
    // ========================================================================

    /// Re-detection of this issue by an analysis pass.
    ///
    /// Stamps the current pass's operation id, refreshes the descriptive
    /// fields, and advances `last_updated_at`. Returns a `Reactivated` entry
    /// if the issue was inactive, otherwise `Touched`. A stale-but-active
    /// issue (old operation id left by an unfinished pass) counts as
    /// `Touched`: reactivation is reserved for `is_active == false`.
    pub fn record_detection(
        &mut self,
        operation_id: OperationId,
        descriptor: IssueDescriptor,
    ) -> IssueHistoryEntry {
        let reactivated = !self.is_active;

        self.operation_id = operation_id;
        self.cts_lid = descriptor.cts_lid;
        self.cph = descriptor.cph;
        self.issue_code = descriptor.issue_code;
        self.rule_code = descriptor.rule_code;
        self.error_code = descriptor.error_code;
        self.error_description = descriptor.error_description;
        self.contact = descriptor.contact;
        self.is_active = true;
        self.last_updated_at = Utc::now();

        let action = if reactivated {
            IssueAction::Reactivated
        } else {
            IssueAction::Touched
        };
        IssueHistoryEntry::new(self.id.clone(), action, Actor::system(), None)
    }

    /// Close the issue. Does not touch the ignore flag or resolution status.
    pub fn deactivate(&mut self, performed_by: Actor, detail: Option<String>) -> IssueHistoryEntry {
        self.is_active = false;
        self.last_updated_at = Utc::now();
        IssueHistoryEntry::new(self.id.clone(), IssueAction::Deactivated, performed_by, detail)
    }

    // ========================================================================
    // MANUAL TRANSITIONS
    // ========================================================================

    /// Set the manual ignore flag. Activity is unaffected.
    pub fn ignore(&mut self, performed_by: Actor) -> IssueHistoryEntry {
        self.is_ignored = true;
        self.last_updated_at = Utc::now();
        IssueHistoryEntry::new(self.id.clone(), IssueAction::Ignored, performed_by, None)
    }

    /// Clear the manual ignore flag. Activity is unaffected.
    pub fn unignore(&mut self, performed_by: Actor) -> IssueHistoryEntry {
        self.is_ignored = false;
        self.last_updated_at = Utc::now();
        IssueHistoryEntry::new(self.id.clone(), IssueAction::Unignored, performed_by, None)
    }

    /// Change the manual workflow status, recording `previous -> new`.
    pub fn set_resolution_status(
        &mut self,
        status: ResolutionStatus,
        performed_by: Actor,
    ) -> IssueHistoryEntry {
        let previous = self.resolution_status;
        self.resolution_status = status;
        self.last_updated_at = Utc::now();
        IssueHistoryEntry::new(
            self.id.clone(),
            IssueAction::ResolutionStatusChanged,
            performed_by,
            Some(format!("{previous} -> {status}")),
        )
    }

    /// Assign the issue to a person, recording the target.
    pub fn assign(&mut self, assignee: Actor, performed_by: Actor) -> IssueHistoryEntry {
        let detail = Some(format!("assigned to {assignee}"));
        self.assigned_to = Some(assignee);
        self.last_updated_at = Utc::now();
        IssueHistoryEntry::new(self.id.clone(), IssueAction::Assigned, performed_by, detail)
    }

    /// Clear the assignment, recording the previous owner when there was one.
    pub fn unassign(&mut self, performed_by: Actor) -> IssueHistoryEntry {
        let detail = self
            .assigned_to
            .take()
            .map(|previous| format!("unassigned from {previous}"));
        self.last_updated_at = Utc::now();
        IssueHistoryEntry::new(self.id.clone(), IssueAction::Unassigned, performed_by, detail)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Whether the given pass has already touched this issue.
    #[must_use]
    pub fn touched_by(&self, operation_id: &OperationId) -> bool {
        &self.operation_id == operation_id
    }
}

// ============================================================================
// TESTS
// ============================================================================
