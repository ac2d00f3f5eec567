// src/core/session.rs

use crate::{
    CancellationToken,
    constants::{
        DEFAULT_DNS, DEFAULT_HOSTNAME, HISTORY_FILENAME,
        STAGED_COMMAND_NOT_FOUND_PATH,
    },
    core::provisioner::{self, ProvisionError},
    models::{
        ContainerSpec, ExecRequest, InvalidPackageName, LifecycleState, Mount, ProvisionSettings,
        ProvisioningStep, Session, StepCommand,
    },
    system::{
        executor::{CommandStatus, ExecutionError},
        runtime::{ContainerRuntime, RuntimeError},
    },
};
use colored::Colorize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No image given to create the container from.")]
    EmptyImage,
    #[error(transparent)]
    InvalidPackage(#[from] InvalidPackageName),
    #[error("'{0}' is not a valid user name.")]
    InvalidUser(String),
    #[error("Could not find the home directory of the current user.")]
    HomeDir,
    #[error("Could not create the container: {0}")]
    Create(#[source] RuntimeError),
    #[error("Could not copy '{path}' into the container: {source}")]
    Stage {
        path: String,
        #[source]
        source: RuntimeError,
    },
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("Could not attach to the container: {0}")]
    Attach(#[source] ExecutionError),
}

impl SessionError {
    /// Whether the session ended because the process was asked to stop.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Create(e) | Self::Stage { source: e, .. } => e.is_interrupted(),
            Self::Provision(e) => matches!(e, ProvisionError::Interrupted { .. }),
            Self::Attach(e) => matches!(e, ExecutionError::Interrupted { .. }),
            _ => false,
        }
    }

    /// Tag of the failing provisioning step, if a step failed.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            Self::Provision(e) => Some(e.step()),
            _ => None,
        }
    }
}

/// Everything that shapes one session besides the runtime itself.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub hostname: String,
    pub dns: Vec<String>,
    pub privileged: bool,
    pub mounts: Vec<Mount>,
    /// Host file staged as the command-not-found helper (variant B).
    pub command_not_found: Option<PathBuf>,
    /// Host shell history copied into the user's home before attaching.
    pub history_file: Option<PathBuf>,
    /// Command run instead of the login shell. Empty means the login shell.
    pub command: Vec<String>,
    pub settings: ProvisionSettings,
}

impl SessionOptions {
    pub fn new(settings: ProvisionSettings) -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            dns: DEFAULT_DNS.iter().map(|s| s.to_string()).collect(),
            privileged: false,
            mounts: Vec::new(),
            command_not_found: None,
            history_file: None,
            command: Vec::new(),
            settings,
        }
    }

    /// Settings with the staging flag matching whether a helper file is configured.
    fn effective_settings(&self) -> ProvisionSettings {
        let mut settings = self.settings.clone();
        settings.stage_command_not_found = self.command_not_found.is_some();
        settings
    }
}

/// Creates the session's container, provisions it, attaches an interactive session and
/// removes the container again.
///
/// Returns the exit code of the interactive session. Once the container exists, its
/// removal is guaranteed: it runs exactly once when this function returns, whether the
/// session ended normally, a step failed, attaching failed or a signal interrupted us.
pub fn run_session<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    session: &mut Session,
    options: &SessionOptions,
    cancellation_token: &CancellationToken,
) -> Result<i32, SessionError> {
    if session.image.trim().is_empty() {
        return Err(SessionError::EmptyImage);
    }

    // --- Created ---
    let spec = container_spec(session, options);
    let container_id = match runtime.create(&spec, cancellation_token) {
        Ok(container_id) => container_id,
        Err(e) => {
            if e.may_have_created() {
                discard_by_name(runtime, session);
            }
            return Err(SessionError::Create(e));
        }
    };
    session.container_id = Some(container_id.clone());
    session.advance(LifecycleState::Created);
    println!(
        "{} '{}' ({})",
        "Created container".green(),
        session.name.yellow().bold(),
        short_id(&container_id)
    );

    let mut session = scopeguard::guard(session, |session| teardown(runtime, session));

    // --- Provisioning ---
    session.advance(LifecycleState::Provisioning);
    if let Some(path) = &options.command_not_found {
        runtime
            .copy_file_in(
                &container_id,
                path,
                STAGED_COMMAND_NOT_FOUND_PATH,
                cancellation_token,
            )
            .map_err(|source| SessionError::Stage {
                path: path.display().to_string(),
                source,
            })?;
    }
    let settings = options.effective_settings();
    let report = provisioner::provision(runtime, &container_id, &settings, cancellation_token)?;
    log::info!(
        "Provisioned '{}' in {} steps ({} tolerated).",
        session.name,
        report.steps.len(),
        report.tolerated().count()
    );

    prepare_session(runtime, &container_id, options, &settings, cancellation_token)?;

    // --- Attached ---
    session.advance(LifecycleState::Attached);
    println!(
        "\n--- {} '{}' {}. ---",
        "tempsystem".green(),
        session.name.yellow().bold(),
        "ready".green()
    );
    let status = runtime
        .exec(&container_id, &attach_request(options, &settings), cancellation_token)
        .map_err(SessionError::Attach)?;
    if !status.success() {
        log::warn!("Interactive session exited with {:?}", status);
    }
    Ok(exit_code(status))
}

/// Removes the session's container. Runs at most once per session; failures are
/// reported and swallowed.
pub fn teardown<R: ContainerRuntime + ?Sized>(runtime: &R, session: &mut Session) {
    if session.state() == LifecycleState::Removed {
        return;
    }
    let Some(container_id) = session.container_id.clone() else {
        return;
    };

    println!("{} '{}'...", "Deleting container".dimmed(), session.name);
    if let Err(e) = runtime.remove(&container_id) {
        log::error!("Failed to remove container {}: {}", container_id, e);
        eprintln!(
            "{}",
            format!(
                "could not delete container '{}' ({}): {}",
                session.name, container_id, e
            )
            .red()
        );
    }
    session.advance(LifecycleState::Removed);
}

/// `create` was cut short or failed after the runtime started, so a container named
/// after the session may exist without us knowing its id. Removal is shielded like
/// the regular teardown; "no such container" is the common answer and only logged.
fn discard_by_name<R: ContainerRuntime + ?Sized>(runtime: &R, session: &mut Session) {
    log::debug!("Removing possibly half-created container '{}'", session.name);
    if let Err(e) = runtime.remove(&session.name) {
        log::warn!("Could not remove container '{}': {}", session.name, e);
    }
    session.advance(LifecycleState::Removed);
}

fn container_spec(session: &Session, options: &SessionOptions) -> ContainerSpec {
    ContainerSpec {
        name: session.name.clone(),
        image: session.image.clone(),
        hostname: options.hostname.clone(),
        dns: options.dns.clone(),
        privileged: options.privileged,
        mounts: options.mounts.clone(),
    }
}

/// Seeds the work directory and brings in the shell history, once the user exists.
fn prepare_session<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    options: &SessionOptions,
    settings: &ProvisionSettings,
    cancellation_token: &CancellationToken,
) -> Result<(), SessionError> {
    let history_target = format!("{}/{}", settings.home, HISTORY_FILENAME);
    if let Some(path) = &options.history_file {
        runtime
            .copy_file_in(container_id, path, &history_target, cancellation_token)
            .map_err(|source| SessionError::Stage {
                path: path.display().to_string(),
                source,
            })?;
    }

    let steps = session_steps(options, settings, &history_target);
    provisioner::run_steps(runtime, container_id, settings, &steps, cancellation_token)?;
    Ok(())
}

fn session_steps(
    options: &SessionOptions,
    settings: &ProvisionSettings,
    history_target: &str,
) -> Vec<ProvisioningStep> {
    let mut steps = vec![ProvisioningStep::fatal(
        "seed-workdir",
        "Preparing the work directory",
        vec![StepCommand::user(["mkdir", "-p", settings.work_dir().as_str()])],
    )];
    if options.history_file.is_some() {
        let owner = format!("{}:", settings.user);
        steps.push(ProvisioningStep::fatal(
            "adopt-history",
            "Handing the shell history to the session user",
            vec![StepCommand::root(["chown", owner.as_str(), history_target])],
        ));
    }
    steps
}

fn attach_request(options: &SessionOptions, settings: &ProvisionSettings) -> ExecRequest {
    let argv = if options.command.is_empty() {
        vec![settings.shell.clone(), "-l".to_string()]
    } else {
        options.command.clone()
    };
    let command = StepCommand::user(argv)
        .in_dir(settings.work_dir())
        .with_env("SHOW_WELCOME", "true");
    ExecRequest {
        interactive: true,
        ..provisioner::exec_request("session", &command, settings)
    }
}

/// Shell convention: a signal-terminated session reports `128 + signal`.
fn exit_code(status: CommandStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

fn short_id(container_id: &str) -> &str {
    container_id.get(..12).unwrap_or(container_id)
}
