//! # Coordination Layer
//!
//! Mutual exclusion for analysis passes. Two interleaved passes over the
//! same dataset would each sweep the other's still-valid issues, so at most
//! one pass may be in flight at a time. The engine consumes the
//! [`locks::PassLock`] contract; [`locks::InProcessLock`] covers tests and
//! single-process embedders, while the sqlite store implements the same
//! contract so that processes sharing one database exclude each other.

#![forbid(unsafe_code)]

pub mod locks;

pub use locks::{InProcessLock, LockError, LockGuard, PassLock};
