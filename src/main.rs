use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use panectl::cli::{Cli, Command};
use panectl::commands::{self, App};
use panectl::config::ToolConfig;
use panectl::error::PaneError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "panectl=warn",
        1 => "panectl=info",
        2 => "panectl=debug",
        _ => "panectl=trace",
    };
    // stdout carries command results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

fn run(cli: Cli) -> Result<()> {
    let is_completions = matches!(cli.command, Command::Completions { .. });
    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (config, config_path) = if is_completions {
        (ToolConfig::default(), None)
    } else {
        ToolConfig::load(&cwd)?
    };

    match config_path {
        Some(ref p) => info!("loaded config from {}", p.display()),
        None => info!("no config file found, using defaults"),
    }

    let app = App::new(config, config_path, cli.output);
    commands::dispatch(&app, cli.command)
}

/// Print `CODE: message` for typed failures, `error: ...` otherwise.
fn report_error(err: &anyhow::Error) -> ExitCode {
    match err.chain().find_map(|e| e.downcast_ref::<PaneError>()) {
        Some(pane_err) => eprintln!("{}: {err:#}", pane_err.code()),
        None => eprintln!("error: {err:#}"),
    }
    ExitCode::FAILURE
}
