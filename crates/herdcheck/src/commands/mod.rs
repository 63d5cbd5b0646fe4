//! Command implementations, one module per top-level command.

pub mod issues;
pub mod purge;
pub mod run;
pub mod runs;

use std::sync::Arc;

use anyhow::{Context, Result};
use herdcheck_core::{IssueCommandService, SqliteStore};

/// Open (and if necessary create) the store behind every command.
pub async fn open_store(db_url: &str) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(db_url)
        .await
        .context("cannot open the issue database")?;
    Ok(Arc::new(store))
}

/// The issue command service over a shared store.
pub fn issue_service(store: &Arc<SqliteStore>) -> IssueCommandService {
    IssueCommandService::new(store.clone(), store.clone())
}
