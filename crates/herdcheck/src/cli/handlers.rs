//! CLI command handlers that bridge between `clap` and command logic

use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use herdcheck_core::{Actor, IssueCode, IssueId, ResolutionStatus, RunId};

use crate::{
    cli::commands::build_cli,
    commands::{issues, purge, run, runs},
};

/// Format an error for user display (no stack traces)
pub fn format_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if let Some(source) = err.source() {
        let source_msg = source.to_string();
        if !msg.contains(&source_msg) && !source_msg.is_empty() {
            return format!("{msg}\nCause: {source_msg}");
        }
    }
    msg
}

fn db_url(sub_m: &ArgMatches) -> Result<String> {
    let path = sub_m
        .get_one::<String>("db")
        .ok_or_else(|| anyhow!("--db has a default and must be present"))?;
    Ok(format!("sqlite://{path}?mode=rwc"))
}

fn actor(sub_m: &ArgMatches) -> Result<Actor> {
    match sub_m.get_one::<String>("by") {
        Some(name) => Actor::parse(name).context("invalid --by actor"),
        None => Ok(Actor::system()),
    }
}

fn issue_id(sub_m: &ArgMatches) -> Result<IssueId> {
    let raw = sub_m
        .get_one::<String>("id")
        .ok_or_else(|| anyhow!("issue id is required"))?;
    IssueId::parse(raw).context("invalid issue id")
}

async fn handle_issues(sub_m: &ArgMatches) -> Result<()> {
    let url = db_url(sub_m)?;
    match sub_m.subcommand() {
        Some(("list", m)) => {
            let code = m
                .get_one::<String>("code")
                .map(|raw| IssueCode::parse(raw).context("invalid issue code"))
                .transpose()?;
            issues::list(&url, code.as_ref(), !m.get_flag("all"), m.get_flag("json")).await
        }
        Some(("show", m)) => issues::show(&url, &issue_id(m)?, m.get_flag("json")).await,
        Some(("ignore", m)) => issues::ignore(&url, &issue_id(m)?, actor(m)?).await,
        Some(("unignore", m)) => issues::unignore(&url, &issue_id(m)?, actor(m)?).await,
        Some(("assign", m)) => {
            let assignee = m
                .get_one::<String>("assignee")
                .ok_or_else(|| anyhow!("assignee is required"))?;
            let assignee = Actor::parse(assignee).context("invalid assignee")?;
            issues::assign(&url, &issue_id(m)?, assignee, actor(m)?).await
        }
        Some(("unassign", m)) => issues::unassign(&url, &issue_id(m)?, actor(m)?).await,
        Some(("resolve", m)) => {
            let status = match m
                .get_one::<String>("status")
                .map(String::as_str)
                .ok_or_else(|| anyhow!("status is required"))?
            {
                "none" => ResolutionStatus::None,
                "todo" => ResolutionStatus::Todo,
                "in-progress" => ResolutionStatus::InProgress,
                "resolved" => ResolutionStatus::Resolved,
                // The clap value parser rejects everything else already.
                other => return Err(anyhow!("unsupported status '{other}'")),
            };
            issues::resolve(&url, &issue_id(m)?, status, actor(m)?).await
        }
        _ => Err(anyhow!("unknown issues subcommand")),
    }
}

async fn handle_runs(sub_m: &ArgMatches) -> Result<()> {
    match sub_m.subcommand() {
        Some(("show", m)) => {
            let raw = m
                .get_one::<String>("id")
                .ok_or_else(|| anyhow!("run id is required"))?;
            let id = RunId::parse(raw).context("invalid run id")?;
            runs::show(&db_url(m)?, &id, m.get_flag("json")).await
        }
        _ => Err(anyhow!("unknown runs subcommand")),
    }
}

pub async fn run_cli() -> Result<()> {
    let matches = build_cli().get_matches();
    match matches.subcommand() {
        Some(("run", m)) => {
            let records = m
                .get_one::<String>("records")
                .ok_or_else(|| anyhow!("record file is required"))?;
            run::execute(&db_url(m)?, records, m.get_flag("json")).await
        }
        Some(("issues", m)) => handle_issues(m).await,
        Some(("runs", m)) => handle_runs(m).await,
        Some(("purge", m)) => purge::execute(&db_url(m)?, m.get_flag("yes")).await,
        _ => Err(anyhow!("a subcommand is required; see 'herdcheck --help'")),
    }
}
