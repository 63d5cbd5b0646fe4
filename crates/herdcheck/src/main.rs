//! Herdcheck CLI - data-quality analysis over livestock registry records
//!
//! Binary name: `herdcheck`

#![forbid(unsafe_code)]

use std::process;

mod cli;
mod commands;
mod records;
mod rules;

use cli::handlers::{format_error, run_cli};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run_cli().await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {}", format_error(&err));
        }
        #[allow(clippy::exit)]
        process::exit(1);
    }
}
