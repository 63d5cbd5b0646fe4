//! `herdcheck issues` - query and manage individual issues.

use anyhow::{anyhow, Context, Result};
use herdcheck_core::{
    domain::repository::{IssueHistoryRepository, IssueRepository},
    Actor, Issue, IssueCode, IssueId, ResolutionStatus,
};
use serde_json::json;

use crate::commands::{issue_service, open_store};

fn print_issue_line(issue: &Issue) {
    let flags = format!(
        "{}{}",
        if issue.is_active { "" } else { " [closed]" },
        if issue.is_ignored { " [ignored]" } else { "" },
    );
    println!(
        "{}  {}  {}  {}{}",
        issue.id, issue.issue_code, issue.cph, issue.cts_lid, flags
    );
}

pub async fn list(
    db_url: &str,
    code: Option<&IssueCode>,
    active_only: bool,
    json: bool,
) -> Result<()> {
    let store = open_store(db_url).await?;
    let issues = match code {
        Some(code) => store.find_by_code(code, active_only).await?,
        None => store.list_active().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else if issues.is_empty() {
        println!("No issues found.");
    } else {
        for issue in &issues {
            print_issue_line(issue);
        }
        println!("{} issue(s)", issues.len());
    }
    Ok(())
}

pub async fn show(db_url: &str, id: &IssueId, json: bool) -> Result<()> {
    let store = open_store(db_url).await?;
    let issue = store
        .get(id)
        .await?
        .ok_or_else(|| anyhow!("no issue with id '{id}'"))?;
    let history = store.list_for_issue(id).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "issue": issue, "history": history }))?
        );
        return Ok(());
    }

    print_issue_line(&issue);
    println!("  status:      {}", issue.resolution_status);
    if let Some(assignee) = &issue.assigned_to {
        println!("  assigned to: {assignee}");
    }
    if let Some(description) = &issue.error_description {
        println!("  description: {description}");
    }
    println!("  created:     {}", issue.created_at.to_rfc3339());
    println!("  updated:     {}", issue.last_updated_at.to_rfc3339());
    println!("History:");
    for entry in &history {
        let detail = entry
            .detail
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!(
            "  {}  {}  by {}{}",
            entry.occurred_at.to_rfc3339(),
            entry.action,
            entry.performed_by,
            detail
        );
    }
    Ok(())
}

pub async fn ignore(db_url: &str, id: &IssueId, by: Actor) -> Result<()> {
    let store = open_store(db_url).await?;
    issue_service(&store)
        .ignore(id, by)
        .await
        .context("cannot ignore issue")?;
    println!("Issue {id} ignored.");
    Ok(())
}

pub async fn unignore(db_url: &str, id: &IssueId, by: Actor) -> Result<()> {
    let store = open_store(db_url).await?;
    issue_service(&store)
        .unignore(id, by)
        .await
        .context("cannot unignore issue")?;
    println!("Issue {id} no longer ignored.");
    Ok(())
}

pub async fn assign(db_url: &str, id: &IssueId, assignee: Actor, by: Actor) -> Result<()> {
    let store = open_store(db_url).await?;
    issue_service(&store)
        .assign(id, assignee.clone(), by)
        .await
        .context("cannot assign issue")?;
    println!("Issue {id} assigned to {assignee}.");
    Ok(())
}

pub async fn unassign(db_url: &str, id: &IssueId, by: Actor) -> Result<()> {
    let store = open_store(db_url).await?;
    issue_service(&store)
        .unassign(id, by)
        .await
        .context("cannot unassign issue")?;
    println!("Issue {id} unassigned.");
    Ok(())
}

pub async fn resolve(
    db_url: &str,
    id: &IssueId,
    status: ResolutionStatus,
    by: Actor,
) -> Result<()> {
    let store = open_store(db_url).await?;
    issue_service(&store)
        .update_resolution_status(id, status, by)
        .await
        .context("cannot update resolution status")?;
    println!("Issue {id} is now {status}.");
    Ok(())
}
