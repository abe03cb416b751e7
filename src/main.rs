//! Evoke - incremental static site builder.

use anyhow::{Context, Result, anyhow};
use clap::{ColorChoice, Parser};
use evoke::build::build_with_cancel;
use evoke::cli::{Cli, Commands};
use evoke::config::SiteConfig;
use evoke::scheduler::CancelToken;
use evoke::{log, logger};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log!("error"; "{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let cancel = CancelToken::new();
    setup_shutdown_handler(&cancel)?;

    match &cli.command {
        Commands::Build { build_args } => {
            logger::set_verbose(build_args.verbose);
            let config = SiteConfig::load(&cli.config).context("failed to load config")?;
            build_with_cancel(&config, &build_args.options(), &cancel)?;
            Ok(())
        }
    }
}

/// First Ctrl+C cancels the build and lets workers wind down; a second one
/// exits immediately.
fn setup_shutdown_handler(cancel: &CancelToken) -> Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        if cancel.is_canceled() {
            std::process::exit(130);
        }
        log!("build"; "canceling...");
        cancel.cancel();
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))
}
