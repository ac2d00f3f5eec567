// src/cli/handlers/start.rs

use anyhow::{Context, Result};
use colored::Colorize;
use std::env;

use super::commons;
use crate::{
    CancellationToken,
    cli::Cli,
    core::{config_loader, session},
    models::Session,
    system::runtime::CliRuntime,
};

/// Runs one full session and returns the exit code of its interactive process.
pub fn handle(cli: &Cli, cancellation_token: &CancellationToken) -> Result<i32> {
    // 1. Resolve preferences: config file first, flags on top.
    let config = config_loader::load_user_config()?;
    let cwd = env::current_dir().context("Could not determine the current directory")?;
    let plan = commons::build_plan(cli, &config, &cwd)?;

    // 2. Find the container runtime before anything is created.
    let runtime = CliRuntime::detect(&plan.runtime)?;
    log::info!("Using container runtime '{}'", runtime.program().display());

    // 3. Hand over to the lifecycle manager.
    let mut session = Session::new(plan.image);
    println!(
        "{} '{}' from {}",
        "Starting".green().bold(),
        session.name.yellow(),
        session.image.cyan()
    );
    let code = session::run_session(&runtime, &mut session, &plan.options, cancellation_token)?;
    log::debug!("Session '{}' finished with code {}", session.name, code);
    Ok(code)
}
