//! Deterministic issue identity (thumbprint) generation.
//!
//! The thumbprint is a SHA-256 digest over the ordered key parts, hex
//! encoded: fixed width, case-sensitive, URL/path-safe, stable across
//! process restarts and platforms. Each part is length-prefixed before
//! hashing so distinct sequences cannot collide by concatenation
//! (`["ab","c"]` vs `["a","bc"]`), and ordering is significant.
//!
//! Reprocessing the same (record, rule) pair in any later run therefore
//! resolves to the same issue instead of creating a duplicate.

#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::identifiers::IssueId;

/// Validation errors for thumbprint input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// No key parts supplied.
    #[error("thumbprint requires at least one key part")]
    NoParts,

    /// A key part was empty.
    #[error("thumbprint key part {index} is empty")]
    EmptyPart { index: usize },
}

/// Compute the deterministic thumbprint for an ordered list of key parts.
///
/// # Errors
///
/// Returns `IdentityError::NoParts` for an empty list and
/// `IdentityError::EmptyPart` if any part is empty or whitespace-only.
pub fn thumbprint<S: AsRef<str>>(parts: &[S]) -> Result<IssueId, IdentityError> {
    if parts.is_empty() {
        return Err(IdentityError::NoParts);
    }

    let mut hasher = Sha256::new();
    for (index, part) in parts.iter().enumerate() {
        let part = part.as_ref();
        if part.trim().is_empty() {
            return Err(IdentityError::EmptyPart { index });
        }
        // Length prefix keeps part boundaries unambiguous.
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }

    let digest = hasher.finalize();
    let encoded = hex::encode(digest);
    // A 64-char lowercase hex string always satisfies identifier validation.
    IssueId::parse(encoded).map_err(|_| IdentityError::NoParts)
}
