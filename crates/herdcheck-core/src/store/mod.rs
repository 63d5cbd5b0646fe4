//! # Store Layer
//!
//! Concrete implementations of the repository traits:
//!
//! - [`memory`] - in-memory stores for tests and non-durable embedders
//! - [`sqlite`] - durable sqlx/SQLite store

#![forbid(unsafe_code)]

pub mod memory;
pub mod sqlite;

pub use memory::{
    InMemoryAnalysisRunRepository, InMemoryIssueHistoryRepository, InMemoryIssueRepository,
};
pub use sqlite::SqliteStore;
