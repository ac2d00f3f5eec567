// src/bin/tempsystem.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tempsystem::{
    CancellationToken,
    cli::{Cli, handlers},
    constants::INTERRUPTED_EXIT_CODE,
    core::session::SessionError,
    system::{executor, signals},
};

/// The main entry point of the `tempsystem` application.
/// It sets up logging and signal handling, runs the session and performs centralized
/// error handling.
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    if let Err(e) = signals::install(&cancellation_token) {
        // Without the bridge a signal kills us before teardown; still usable, so only warn.
        log::warn!("Could not install signal handlers: {}", e);
    }

    match run_cli(&cli, &cancellation_token) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // --- Centralized Error Handling ---
            if is_interruption(&e) || executor::is_cancelled(&cancellation_token) {
                eprintln!("\n{}", "Interrupted.".yellow());
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            eprintln!("\n{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn is_interruption(error: &anyhow::Error) -> bool {
    if let Some(session_err) = error.downcast_ref::<SessionError>() {
        return session_err.is_interrupted();
    }
    matches!(
        error.downcast_ref::<executor::ExecutionError>(),
        Some(executor::ExecutionError::Interrupted { .. })
    )
}

fn run_cli(cli: &Cli, cancellation_token: &CancellationToken) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);
    handlers::start::handle(cli, cancellation_token)
}
