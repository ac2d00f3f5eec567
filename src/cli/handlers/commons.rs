// src/cli/handlers/commons.rs

// Turns parsed arguments plus the config file into a ready-to-run session plan.

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::{
    cli::{Cli, HistorySync},
    constants::{DEFAULT_IMAGE, DEFAULT_RUNTIME, DEFAULT_USER, HISTORY_FILENAME},
    core::{paths, session::{SessionError, SessionOptions}},
    models::{ExtraRepository, Mount, PackageSet, ProvisionSettings, UserConfig},
};

lazy_static! {
    /// Login names accepted by `useradd`, restricted to what is safe inside a shell script.
    static ref USER_NAME: Regex =
        Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("user name pattern is valid");
}

/// Everything the `start` handler needs, resolved from CLI flags and config.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    /// Runtime selection: `auto`, a runtime name, or a path.
    pub runtime: String,
    pub image: String,
    pub options: SessionOptions,
}

/// Merges `cli` over `config`. Package lists are unioned; every other CLI value wins.
///
/// `cwd` is the directory bound to the work directory unless the mount is disabled.
pub fn build_plan(cli: &Cli, config: &UserConfig, cwd: &Path) -> Result<SessionPlan> {
    let image = cli
        .image
        .clone()
        .or_else(|| config.image.clone())
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string());
    if image.trim().is_empty() {
        return Err(SessionError::EmptyImage.into());
    }

    let runtime = cli
        .runtime
        .clone()
        .or_else(|| config.runtime.clone())
        .unwrap_or_else(|| DEFAULT_RUNTIME.to_string());

    let settings = build_settings(cli, config)?;
    let mut options = SessionOptions::new(settings);
    if let Some(hostname) = &config.hostname {
        options.hostname = hostname.clone();
    }
    if let Some(dns) = &config.dns {
        options.dns = dns.clone();
    }
    options.privileged = cli.privileged;
    options.command = cli.command.clone();

    if !cli.disable_cwd_mount {
        let host = paths::canonicalize(cwd)
            .map_err(|e| anyhow!("Could not resolve current directory '{}': {}", cwd.display(), e))?;
        options.mounts.push(Mount {
            host,
            target: options.settings.work_dir(),
            read_only: cli.ro_cwd,
        });
    }

    if let Some(template) = cli.command_not_found.as_ref().or(config.command_not_found.as_ref()) {
        let path = paths::expand_path(template)?;
        if !path.is_file() {
            return Err(anyhow!(
                "Command-not-found helper '{}' is not a file.",
                path.display()
            ));
        }
        options.command_not_found = Some(path);
    }

    if let Some(mode) = cli.sync_history {
        let history = paths::get_host_history_path().map_err(|_| SessionError::HomeDir)?;
        add_history(&mut options, mode, history);
    }

    Ok(SessionPlan {
        runtime,
        image,
        options,
    })
}

/// A missing history file is skipped: bind-mounting it would create a directory.
fn add_history(options: &mut SessionOptions, mode: HistorySync, history: PathBuf) {
    if !history.is_file() {
        log::warn!("No shell history at '{}', skipping.", history.display());
        return;
    }
    match mode {
        HistorySync::Copy => options.history_file = Some(history),
        HistorySync::Mount => {
            let target = format!("{}/{}", options.settings.home, HISTORY_FILENAME);
            options.mounts.push(Mount {
                host: history,
                target,
                read_only: false,
            });
        }
    }
}

fn build_settings(cli: &Cli, config: &UserConfig) -> Result<ProvisionSettings, SessionError> {
    let user = config.user.as_deref().unwrap_or(DEFAULT_USER);
    if !USER_NAME.is_match(user) {
        return Err(SessionError::InvalidUser(user.to_string()));
    }

    let mut settings = ProvisionSettings::for_user(user);
    if let Some(shell) = &config.shell {
        settings.shell = shell.clone();
    }
    if let Some(retries) = config.fetch_retries {
        settings.fetch_retries = retries;
    }
    if let Some(url) = &config.installer_url {
        settings.installer_url = url.clone();
    }
    settings.packages =
        PackageSet::parse(config.extra_packages.iter().chain(&cli.extra_packages))?;
    settings.aur_packages =
        PackageSet::parse(config.extra_aur_packages.iter().chain(&cli.extra_aur_packages))?;
    if cli.chaotic_aur {
        settings.repositories.push(ExtraRepository::ChaoticAur);
    }
    if cli.landware {
        settings.repositories.push(ExtraRepository::Landware);
    }
    settings.update_pkgfile = cli.update_pkgfile;
    Ok(settings)
}
