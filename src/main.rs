//! metasift - select files by the metadata an external prober reports
//!
//! Entry point for the CLI application.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use metasift::RunContext;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.debug, cli.quiet);

    // Ctrl-C stops new work; in-flight probes and scripts finish
    let ctx = RunContext::new();
    let handler_ctx = ctx.clone();
    ctrlc::set_handler(move || handler_ctx.cancel())
        .context("Failed to set signal handler")?;

    cli::run(cli, ctx)
}

/// Logs go to stderr so stdout stays clean for results. `RUST_LOG`
/// overrides the flags.
fn setup_logging(debug: bool, quiet: bool) {
    let level = match (debug, quiet) {
        (_, true) => "error",
        (true, false) => "debug",
        (false, false) => "info",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("metasift={},warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
