// src/models.rs

use crate::constants;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

lazy_static! {
    /// Arch package names: lowercase alphanumerics and `@._+-`, never starting with `-` or `.`.
    static ref PACKAGE_NAME: Regex =
        Regex::new(r"^[a-z0-9@_+][a-z0-9@._+-]*$").expect("package name pattern is valid");
}

// --- `config.toml` MODEL (What is read from the configuration file) ---

/// Represents the deserialized structure of `~/.config/tempsystem/config.toml`.
/// Every key is optional; command-line flags take precedence over it.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UserConfig {
    /// `docker`, `podman`, `auto` or a path to a runtime binary.
    pub runtime: Option<String>,
    pub image: Option<String>,
    pub user: Option<String>,
    pub shell: Option<String>,
    pub hostname: Option<String>,
    pub dns: Option<Vec<String>>,
    pub fetch_retries: Option<u32>,
    pub installer_url: Option<String>,
    /// Packages always installed on top of the base list.
    pub extra_packages: Vec<String>,
    pub extra_aur_packages: Vec<String>,
    /// Host path of a command-not-found helper to stage into every container.
    pub command_not_found: Option<String>,
}

// --- PACKAGE SETS ---

/// A package name rejected by [`PackageSet::parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid package name")]
pub struct InvalidPackageName(pub String);

/// Extra packages requested by the invoker.
///
/// Keeps the order in which names were first given and drops repeats, so the
/// install command names every package exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    names: Vec<String>,
}

impl PackageSet {
    /// Builds a set from raw CLI/config values. Each value may itself hold
    /// several names separated by commas or whitespace.
    pub fn parse<I, S>(values: I) -> Result<Self, InvalidPackageName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for value in values {
            for name in value
                .as_ref()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
            {
                if !PACKAGE_NAME.is_match(name) {
                    return Err(InvalidPackageName(name.to_string()));
                }
                set.insert(name);
            }
        }
        Ok(set)
    }

    fn insert(&mut self, name: &str) {
        if !self.contains(name) {
            self.names.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Adds every name of `other` not already present.
    pub fn extend(&mut self, other: &Self) {
        for name in &other.names {
            self.insert(name);
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `base ∪ self`: the base list first, then every extra not already in it.
    pub fn union_with_base(&self, base: &[&str]) -> Vec<String> {
        let mut merged: Vec<String> = Vec::with_capacity(base.len() + self.names.len());
        for name in base.iter().copied().chain(self.names.iter().map(String::as_str)) {
            if !merged.iter().any(|m| m == name) {
                merged.push(name.to_string());
            }
        }
        merged
    }
}

// --- PROVISIONING MODELS ---

/// Explicit context the provisioning steps are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub user: String,
    pub home: String,
    /// Absolute path of the login shell installed by the first step.
    pub shell: String,
    pub packages: PackageSet,
    pub aur_packages: PackageSet,
    pub fetch_retries: u32,
    pub installer_url: String,
    /// Whether a command-not-found helper was copied into the container (variant B).
    pub stage_command_not_found: bool,
    /// Refresh the pkgfile database even without a staged helper.
    pub update_pkgfile: bool,
    /// Third-party pacman repositories enabled before any package is installed.
    pub repositories: Vec<ExtraRepository>,
}

/// Third-party pacman repositories that can be enabled in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraRepository {
    ChaoticAur,
    Landware,
}

impl ProvisionSettings {
    /// Defaults for `user`, with its home under `/home`.
    pub fn for_user(user: &str) -> Self {
        Self {
            user: user.to_string(),
            home: format!("/home/{}", user),
            shell: constants::DEFAULT_SHELL.to_string(),
            packages: PackageSet::default(),
            aur_packages: PackageSet::default(),
            fetch_retries: constants::DEFAULT_FETCH_RETRIES,
            installer_url: constants::FRAMEWORK_INSTALLER_URL.to_string(),
            stage_command_not_found: false,
            update_pkgfile: false,
            repositories: Vec::new(),
        }
    }

    pub fn work_dir(&self) -> String {
        format!("{}/{}", self.home, constants::WORK_DIR_NAME)
    }
}

/// Identity a step command runs as inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAs {
    Root,
    /// The non-privileged session user.
    User,
}

/// What a non-zero exit of a step's command means for the rest of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the remaining steps.
    Fatal,
    /// Log it and carry on.
    Tolerated,
}

/// One command of a provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub run_as: RunAs,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    pub argv: Vec<String>,
    /// Set on repository lookups: a non-zero exit means this package does not exist.
    pub looks_up: Option<String>,
}

impl StepCommand {
    fn new<I, S>(run_as: RunAs, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_as,
            workdir: None,
            env: Vec::new(),
            argv: argv.into_iter().map(Into::into).collect(),
            looks_up: None,
        }
    }

    pub fn root<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RunAs::Root, argv)
    }

    pub fn user<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RunAs::User, argv)
    }

    /// A `sh -c` snippet, for commands that need pipes, globs or redirection.
    pub fn shell(run_as: RunAs, script: impl Into<String>) -> Self {
        Self::new(run_as, ["sh".to_string(), "-c".to_string(), script.into()])
    }

    /// Marks the command as the existence check for `package`.
    pub fn looking_up(mut self, package: impl Into<String>) -> Self {
        self.looks_up = Some(package.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The command line as it would be typed, for messages.
    pub fn display(&self) -> String {
        shlex::try_join(self.argv.iter().map(String::as_str))
            .unwrap_or_else(|_| self.argv.join(" "))
    }
}

/// One unit of setup work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningStep {
    /// Stable kebab-case identifier, used as the log tag and in error messages.
    pub tag: &'static str,
    pub description: &'static str,
    pub commands: Vec<StepCommand>,
    /// Commands always attempted after `commands`, whether they succeeded or not.
    pub cleanup: Vec<StepCommand>,
    pub policy: FailurePolicy,
}

impl ProvisioningStep {
    pub fn fatal(tag: &'static str, description: &'static str, commands: Vec<StepCommand>) -> Self {
        Self {
            tag,
            description,
            commands,
            cleanup: Vec::new(),
            policy: FailurePolicy::Fatal,
        }
    }

    pub fn tolerated(
        tag: &'static str,
        description: &'static str,
        commands: Vec<StepCommand>,
    ) -> Self {
        Self {
            policy: FailurePolicy::Tolerated,
            ..Self::fatal(tag, description, commands)
        }
    }

    pub fn with_cleanup(mut self, cleanup: Vec<StepCommand>) -> Self {
        self.cleanup = cleanup;
        self
    }
}

/// How a step ended when it did not abort the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    /// A command exited non-zero but the step's policy allows it.
    Tolerated { code: Option<i32> },
}

// --- CONTAINER RUNTIME MODELS ---

/// A host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Everything the runtime needs to create the session's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub dns: Vec<String>,
    pub privileged: bool,
    pub mounts: Vec<Mount>,
}

/// A command to execute inside a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Context tag printed in front of the echoed command line.
    pub tag: String,
    pub user: String,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    pub argv: Vec<String>,
    /// Allocate a TTY and forward stdin.
    pub interactive: bool,
}

// --- SESSION MODELS ---

/// Lifecycle of one session's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No container exists yet.
    Pending,
    Created,
    Provisioning,
    Attached,
    Removed,
}

impl LifecycleState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Created)
                | (Self::Created, Self::Provisioning)
                | (Self::Provisioning, Self::Attached)
                | (Self::Created | Self::Provisioning | Self::Attached, Self::Removed)
                // Creation was started but never reported an id.
                | (Self::Pending, Self::Removed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Provisioning => "provisioning",
            Self::Attached => "attached",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// One provisioning run. Owns exactly one container between creation and removal.
#[derive(Debug, Clone)]
pub struct Session {
    /// Container name, unique per session.
    pub name: String,
    pub image: String,
    /// Runtime identifier, set once the container has been created.
    pub container_id: Option<String>,
    state: LifecycleState,
    history: Vec<LifecycleState>,
}

impl Session {
    pub fn new(image: impl Into<String>) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        let short = uuid.get(..8).unwrap_or(&uuid);
        Self {
            name: format!("{}-{}", constants::CONTAINER_NAME_PREFIX, short),
            image: image.into(),
            container_id: None,
            state: LifecycleState::Pending,
            history: vec![LifecycleState::Pending],
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state the session has been in, oldest first.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Moves to `next`. Illegal transitions are ignored and reported as `false`.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if !self.state.can_advance_to(next) {
            log::warn!(
                "Session '{}': ignoring transition {} -> {}",
                self.name,
                self.state,
                next
            );
            return false;
        }
        log::debug!("Session '{}': {} -> {}", self.name, self.state, next);
        self.state = next;
        self.history.push(next);
        true
    }
}
