//! Semantic identifier newtypes for the herdcheck domain.
//!
//! Every identifier is parsed and validated once at the boundary; after
//! construction it cannot represent an invalid state. Deserialization goes
//! through the same validation via `serde(try_from)`.
//!
//! - [`IssueId`] - deterministic issue thumbprint (see `crate::identity`)
//! - [`OperationId`] - identity of one analysis pass, stamped on every touch
//! - [`RunId`] - identity of one `AnalysisRun` record
//! - [`IssueCode`] / [`RuleCode`] - rule-layer classification codes
//! - [`CtsLid`] / [`Cph`] - registry identifiers of the analyzed record
//! - [`Actor`] - who performed a manual operation (or the system actor)

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for identifier validation. Identifiers are otherwise opaque:
/// the registry, not this engine, owns their exact formats.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdError {
    /// Empty string provided where non-empty was required.
    #[error("empty string not allowed for {field}")]
    Empty { field: &'static str },
}

/// Declare a validated string newtype with parse/as_str/Display and
/// validated serde round-trips.
macro_rules! identifier {
    ($(#[$doc:meta])* $name:ident, $field:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate from raw input.
            ///
            /// # Errors
            ///
            /// Returns `IdError::Empty` for empty or whitespace-only input.
            pub fn parse(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdError::Empty { field: $field });
                }
                Ok(Self(value))
            }

            /// Access the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

identifier!(
    /// Deterministic issue thumbprint, produced by `crate::identity::thumbprint`.
    ///
    /// Stable across processes and platforms for the same ordered key parts,
    /// which is what makes `record` idempotent.
    IssueId,
    "issue id"
);

identifier!(
    /// Identity of one analysis pass. Every `record` call during a pass
    /// stamps the touched issue with this id; the reconciliation sweep closes
    /// active issues whose stamp differs from it.
    OperationId,
    "operation id"
);

identifier!(
    /// Identity of one `AnalysisRun` document.
    RunId,
    "run id"
);

identifier!(
    /// Classification code of a detected data-quality issue.
    IssueCode,
    "issue code"
);

identifier!(
    /// Code of the rule that produced a result.
    RuleCode,
    "rule code"
);

identifier!(
    /// County Parish Holding number of the analyzed record.
    Cph,
    "cph"
);

identifier!(
    /// Full Cattle Tracing System lifetime identifier of the analyzed record.
    CtsLid,
    "cts lid"
);

identifier!(
    /// Who performed an operation: a user identity, or the system actor for
    /// transitions driven by the analysis pass itself.
    Actor,
    "actor"
);

impl Actor {
    /// Literal actor recorded for transitions the engine performs itself.
    #[must_use]
    pub fn system() -> Self {
        Self("system".to_string())
    }

    /// Whether this is the system actor.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0 == "system"
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generated(prefix: &str) -> String {
    // Timestamp plus process-local counter keeps generated ids unique and
    // roughly sortable by creation time.
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{nanos:016x}-{seq:04x}")
}

impl OperationId {
    /// Mint a fresh operation id for a new analysis pass.
    #[must_use]
    pub fn generate() -> Self {
        Self(generated("op"))
    }
}

impl RunId {
    /// Mint a fresh run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generated("run"))
    }
}

/// Identity of one `IssueHistoryEntry`. Opaque to the stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntryId(String);

impl HistoryEntryId {
    /// Mint a fresh history entry id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generated("hist"))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HistoryEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
