//! `herdcheck runs` - inspect analysis runs.

use anyhow::{Context, Result};
use herdcheck_core::{RunId, RunTracker};

use crate::commands::open_store;

pub async fn show(db_url: &str, id: &RunId, json: bool) -> Result<()> {
    let store = open_store(db_url).await?;
    let run = RunTracker::new(store)
        .get(id)
        .await
        .context("cannot load analysis run")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    println!("Run {}", run.id);
    println!("  status:           {}", run.status);
    println!("  started:          {}", run.started_at.to_rfc3339());
    if let Some(completed) = run.completed_at {
        println!("  completed:        {}", completed.to_rfc3339());
    }
    println!(
        "  records:          {}/{}",
        run.records_analyzed, run.total_records
    );
    println!("  issues found:     {}", run.issues_found);
    println!("  issues resolved:  {}", run.issues_resolved);
    if let Some(duration) = run.duration_ms {
        println!("  duration:         {duration}ms");
    }
    if let Some(error) = &run.error {
        println!("  error:            {error}");
    }
    if let Some(path) = &run.report_path {
        println!("  report:           {path}");
    }
    if let Some(url) = &run.report_url {
        println!("  report url:       {url}");
    }
    Ok(())
}
