//! `herdcheck purge` - administrative reset of the issue store.

use anyhow::{anyhow, Context, Result};

use crate::commands::{issue_service, open_store};

pub async fn execute(db_url: &str, confirmed: bool) -> Result<()> {
    if !confirmed {
        return Err(anyhow!(
            "purge deletes every issue and history entry; re-run with --yes to confirm"
        ));
    }

    let store = open_store(db_url).await?;
    let summary = issue_service(&store)
        .delete_all()
        .await
        .context("purge failed")?;

    println!(
        "Deleted {} issue(s) and {} history entr(ies).",
        summary.issues_deleted, summary.history_deleted
    );
    Ok(())
}
