//! CLI command definitions using `clap`

use clap::{Arg, ArgAction, Command as ClapCommand};

pub fn after_help_text(examples: &[&str]) -> String {
    let mut text = String::from("EXAMPLES:\n");
    for example in examples {
        text.push_str("  ");
        text.push_str(example);
        text.push('\n');
    }
    text
}

fn arg_json() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

fn arg_actor() -> Arg {
    Arg::new("by")
        .long("by")
        .value_name("ACTOR")
        .help("Who performs the change (defaults to 'system')")
}

pub fn cmd_run() -> ClapCommand {
    ClapCommand::new("run")
        .about("Run one analysis pass over a registry record file")
        .long_about(
            "Loads registry records from a JSON file, evaluates every record \
             against the rule pipeline, then closes active issues the pass no \
             longer detected. Exactly one pass can run at a time.",
        )
        .arg(
            Arg::new("records")
                .required(true)
                .value_name("FILE")
                .help("Path to a JSON array of registry records"),
        )
        .arg(arg_json())
        .after_help(after_help_text(&[
            "herdcheck run records.json              Analyze records against the local store",
            "herdcheck run records.json --json       Emit the pass summary as JSON",
            "herdcheck --db herd.db run records.json Use an explicit database file",
        ]))
}

pub fn cmd_issues() -> ClapCommand {
    ClapCommand::new("issues")
        .about("Inspect and manage data-quality issues")
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("list")
                .about("List active issues, sorted by holding (CPH)")
                .arg(
                    Arg::new("code")
                        .long("code")
                        .value_name("ISSUE_CODE")
                        .help("Only issues with this issue code"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .requires("code")
                        .help("Include inactive issues (requires --code)"),
                )
                .arg(arg_json())
                .after_help(after_help_text(&[
                    "herdcheck issues list                   All active issues",
                    "herdcheck issues list --code DQ-101     Active issues for one code",
                    "herdcheck issues list --code DQ-101 --all   Including closed ones",
                ])),
        )
        .subcommand(
            ClapCommand::new("show")
                .about("Show one issue with its full audit history")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_name("ISSUE_ID")
                        .help("The issue identifier (thumbprint)"),
                )
                .arg(arg_json()),
        )
        .subcommand(
            ClapCommand::new("ignore")
                .about("Mark an issue as ignored (it stays active and swept)")
                .arg(Arg::new("id").required(true).value_name("ISSUE_ID"))
                .arg(arg_actor()),
        )
        .subcommand(
            ClapCommand::new("unignore")
                .about("Clear the ignored flag on an issue")
                .arg(Arg::new("id").required(true).value_name("ISSUE_ID"))
                .arg(arg_actor()),
        )
        .subcommand(
            ClapCommand::new("assign")
                .about("Assign an issue to someone")
                .arg(Arg::new("id").required(true).value_name("ISSUE_ID"))
                .arg(
                    Arg::new("assignee")
                        .required(true)
                        .value_name("ASSIGNEE")
                        .help("Who the issue is assigned to"),
                )
                .arg(arg_actor()),
        )
        .subcommand(
            ClapCommand::new("unassign")
                .about("Clear the assignee on an issue")
                .arg(Arg::new("id").required(true).value_name("ISSUE_ID"))
                .arg(arg_actor()),
        )
        .subcommand(
            ClapCommand::new("resolve")
                .about("Set the resolution workflow status on an issue")
                .arg(Arg::new("id").required(true).value_name("ISSUE_ID"))
                .arg(
                    Arg::new("status")
                        .required(true)
                        .value_name("STATUS")
                        .value_parser(["none", "todo", "in-progress", "resolved"])
                        .help("Workflow status to set"),
                )
                .arg(arg_actor())
                .after_help(after_help_text(&[
                    "herdcheck issues resolve <id> resolved --by jo.bloggs",
                    "herdcheck issues resolve <id> in-progress",
                ])),
        )
}

pub fn cmd_runs() -> ClapCommand {
    ClapCommand::new("runs")
        .about("Inspect analysis runs")
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("show")
                .about("Show one analysis run")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_name("RUN_ID")
                        .help("The run identifier printed by 'herdcheck run'"),
                )
                .arg(arg_json()),
        )
}

pub fn cmd_purge() -> ClapCommand {
    ClapCommand::new("purge")
        .about("Delete every issue and history entry (administrative reset)")
        .arg(
            Arg::new("yes")
                .long("yes")
                .action(ArgAction::SetTrue)
                .help("Confirm the deletion"),
        )
        .after_help(after_help_text(&[
            "herdcheck purge --yes                   Wipe issues and history",
        ]))
}

pub fn build_cli() -> ClapCommand {
    ClapCommand::new("herdcheck")
        .about("Data-quality analysis for livestock registry records")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_name("PATH")
                .default_value("herdcheck.db")
                .help("SQLite database file backing the issue store"),
        )
        .subcommand(cmd_run())
        .subcommand(cmd_issues())
        .subcommand(cmd_runs())
        .subcommand(cmd_purge())
}
