//! Pass-level mutual exclusion.
//!
//! The reconciliation protocol is only correct with at most one analysis
//! pass in flight per dataset: interleaved passes would sweep each other's
//! still-valid issues. The engine acquires a named lock once per pass and
//! holds it through the sweep; the guard releases on drop so failure paths
//! cannot leak the lock.

#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use thiserror::Error;

/// Lock acquisition errors. Contention is not an error: `try_acquire`
/// returns `Ok(None)` when the lock is held elsewhere.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// Lock name was empty.
    #[error("lock name must not be empty")]
    EmptyName,

    /// Requested time-to-live was zero.
    #[error("lock ttl must be positive")]
    InvalidTtl,

    /// The lock backend could not be reached.
    #[error("lock backend failure: {0}")]
    Backend(String),
}

/// Held lock. Releases on drop, on every path.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    /// Wrap a release action.
    #[must_use]
    pub fn new(release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            release: Some(release),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Mutual-exclusion contract consumed once per analysis pass.
#[async_trait]
pub trait PassLock: Send + Sync {
    /// Try to acquire the named lock for `ttl`. Returns `Ok(None)` when the
    /// lock is currently held by another pass.
    ///
    /// # Errors
    ///
    /// Returns `LockError` for an empty name or zero ttl; contention is not
    /// an error.
    async fn try_acquire(&self, name: &str, ttl: Duration)
        -> Result<Option<LockGuard>, LockError>;
}

/// In-process lock table: TTL-expiring named locks behind a mutex.
///
/// Suitable for tests and single-process embedders. Processes sharing a
/// database use the store-backed [`PassLock`] implementation instead.
#[derive(Debug, Default, Clone)]
pub struct InProcessLock {
    held: Arc<Mutex<HashMap<String, Instant>>>,
}

impl InProcessLock {
    /// Empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PassLock for InProcessLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        if name.trim().is_empty() {
            return Err(LockError::EmptyName);
        }
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let now = Instant::now();
        let Ok(mut held) = self.held.lock() else {
            // Poisoned table: refuse the lock rather than risk two passes.
            return Ok(None);
        };

        if let Some(expiry) = held.get(name) {
            if *expiry > now {
                return Ok(None);
            }
        }
        let expiry = now + ttl;
        held.insert(name.to_string(), expiry);
        drop(held);

        let table = Arc::clone(&self.held);
        let key = name.to_string();
        Ok(Some(LockGuard::new(Box::new(move || {
            if let Ok(mut held) = table.lock() {
                // Only release our own acquisition; an expired lock may have
                // been taken over by a later pass.
                if held.get(&key) == Some(&expiry) {
                    held.remove(&key);
                }
            }
        }))))
    }
}
