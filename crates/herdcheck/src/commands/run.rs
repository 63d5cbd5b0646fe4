//! `herdcheck run` - one full analysis pass over a record file.

use anyhow::{Context, Result};
use herdcheck_core::{AnalysisPass, CancellationFlag, RunTracker};

use crate::{
    commands::{issue_service, open_store},
    records, rules,
};

pub async fn execute(db_url: &str, records_path: &str, json: bool) -> Result<()> {
    let records = records::load(records_path)?;
    let store = open_store(db_url).await?;

    // The store doubles as the pass lock: concurrent invocations against
    // the same database file exclude each other.
    let pass = AnalysisPass::new(
        rules::default_pipeline()?,
        issue_service(&store),
        RunTracker::new(store.clone()),
        store.clone(),
    );

    let summary = pass
        .execute(&records, &CancellationFlag::new())
        .await
        .context("analysis pass failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run {} completed in {}ms", summary.run_id, summary.duration_ms);
        println!("  records analyzed:  {}", summary.records_analyzed);
        println!("  issues created:    {}", summary.issues_created);
        println!("  issues reactivated: {}", summary.issues_reactivated);
        println!("  issues touched:    {}", summary.issues_touched);
        println!("  issues closed:     {}", summary.issues_swept);
    }
    Ok(())
}
