//! Append-only audit trail for issue transitions.
//!
//! Every mutation of an [`crate::domain::issue::Issue`] produces exactly one
//! [`IssueHistoryEntry`]. Entries are immutable once written; the only
//! permitted removal is the bulk administrative purge.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::identifiers::{Actor, HistoryEntryId, IssueId};

/// What kind of transition an issue underwent.
///
/// Persisted by its stable string name (strum `Display`/`FromStr`) so the
/// store stays readable without a code map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum IssueAction {
    /// Issue created by a `record` call on a fresh identity.
    Created,
    /// Inactive issue re-detected by a later pass.
    Reactivated,
    /// Active issue closed, either explicitly or by the reconciliation sweep.
    Deactivated,
    /// Active issue re-stamped with the current pass's operation id.
    Touched,
    /// Manual ignore flag set.
    Ignored,
    /// Manual ignore flag cleared.
    Unignored,
    /// Manual workflow status changed.
    ResolutionStatusChanged,
    /// Issue assigned to a person.
    Assigned,
    /// Assignment cleared.
    Unassigned,
}

/// One immutable entry in an issue's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueHistoryEntry {
    /// Unique entry id (opaque to the store).
    pub id: HistoryEntryId,
    /// The issue this entry belongs to.
    pub issue_id: IssueId,
    /// The transition that occurred.
    pub action: IssueAction,
    /// Who performed it: a user identity or the system actor.
    pub performed_by: Actor,
    /// Optional human-readable delta (e.g. `Todo -> InProgress`).
    pub detail: Option<String>,
    /// When the transition occurred.
    pub occurred_at: DateTime<Utc>,
}

impl IssueHistoryEntry {
    /// Build a new entry stamped with the current time.
    #[must_use]
    pub fn new(
        issue_id: IssueId,
        action: IssueAction,
        performed_by: Actor,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: HistoryEntryId::generate(),
            issue_id,
            action,
            performed_by,
            detail,
            occurred_at: Utc::now(),
        }
    }
}
