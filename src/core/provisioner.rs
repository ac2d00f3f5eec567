// src/core/provisioner.rs

//! Builds and runs the ordered setup sequence that turns a bare Arch container into a
//! usable zsh environment. Every step is a typed descriptor; one driver executes them.

use crate::{
    CancellationToken,
    constants::{
        AUR_HELPER_BIN, AUR_HELPER_BUILD_DIR, AUR_HELPER_REPO, BASE_PACKAGES,
        CHAOTIC_AUR_KEY, CHAOTIC_AUR_KEYRING_URL, CHAOTIC_AUR_KEYSERVER,
        CHAOTIC_AUR_MIRRORLIST_URL, CHAOTIC_AUR_SECTION, COMMAND_NOT_FOUND_TARGET,
        FETCH_CONNECT_TIMEOUT_SECS, FRAMEWORK_DIR, FRAMEWORK_INSTALLER_PATH, LANDWARE_SECTION,
        MAKEPKG_CONF, MAKEPKG_OPTIONS_LINE, PACMAN_CONF, SHELL_PLUGINS,
        STAGED_COMMAND_NOT_FOUND_PATH,
    },
    dev_utils::{StepClock, format_elapsed},
    models::{
        ExecRequest, ExtraRepository, FailurePolicy, PackageSet, ProvisionSettings,
        ProvisioningStep, RunAs, StepCommand, StepOutcome,
    },
    system::{
        executor::ExecutionError,
        runtime::ContainerRuntime,
    },
};
use colored::Colorize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Step '{step}' could not run a command: {source}")]
    Launch {
        step: &'static str,
        #[source]
        source: ExecutionError,
    },
    #[error("Step '{step}' lost track of a running command: {source}")]
    Wait {
        step: &'static str,
        #[source]
        source: ExecutionError,
    },
    #[error("Step '{step}' failed: '{command}' exited with {}.", describe_code(.code))]
    CommandFailure {
        step: &'static str,
        command: String,
        code: Option<i32>,
    },
    #[error("Step '{step}' failed: package '{package}' does not exist.")]
    PackageNotFound {
        step: &'static str,
        package: String,
    },
    #[error("Step '{step}' was interrupted.")]
    Interrupted { step: &'static str },
}

impl ProvisionError {
    /// Tag of the step that aborted the sequence.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Launch { step, .. }
            | Self::Wait { step, .. }
            | Self::CommandFailure { step, .. }
            | Self::PackageNotFound { step, .. }
            | Self::Interrupted { step } => *step,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

fn tolerated_message(tag: &str, code: Option<i32>) -> String {
    let reason = match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by a signal".to_string(),
    };
    format!("[{}] tolerated ({}), continuing.", tag, reason)
}

/// One step that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub tag: &'static str,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// Every completed step, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub steps: Vec<StepRecord>,
}

impl ProvisionReport {
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.iter().map(|record| record.tag)
    }

    pub fn tolerated(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps
            .iter()
            .filter(|record| matches!(record.outcome, StepOutcome::Tolerated { .. }))
            .map(|record| record.tag)
    }

    pub fn total_elapsed(&self) -> Duration {
        self.steps.iter().map(|record| record.elapsed).sum()
    }

    /// One line per step: tag, duration and, for tolerated steps, the exit code.
    pub fn summary(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|record| {
                let note = match record.outcome {
                    StepOutcome::Succeeded => String::new(),
                    StepOutcome::Tolerated { code } => {
                        format!(" (tolerated {})", describe_code(&code))
                    }
                };
                format!(
                    "{:<26} {:>8}{}",
                    record.tag,
                    format_elapsed(record.elapsed),
                    note
                )
            })
            .collect()
    }
}

// --- Step Construction ---

/// The full, ordered step sequence for `settings`.
///
/// Variant B (a command-not-found helper was staged) differs only by the
/// `stage-command-not-found` step. Extra repositories, extra packages and AUR packages
/// each add their own steps; the base sequence is always present.
pub fn build_steps(settings: &ProvisionSettings) -> Vec<ProvisioningStep> {
    let mut steps: Vec<ProvisioningStep> = settings
        .repositories
        .iter()
        .map(|repository| add_repository(*repository))
        .collect();
    if !settings.packages.is_empty() {
        steps.push(check_packages(&settings.packages));
    }
    steps.push(install_base(settings));
    steps.push(create_user(settings));
    if settings.stage_command_not_found {
        steps.push(stage_command_not_found());
    } else if settings.update_pkgfile {
        steps.push(update_pkgfile());
    }
    steps.push(set_login_shell(settings));
    steps.push(install_framework(settings));
    steps.push(install_plugins(settings));
    steps.push(tune_makepkg());
    steps.push(install_aur_helper());
    if !settings.aur_packages.is_empty() {
        steps.push(check_aur_packages(&settings.aur_packages));
        steps.push(install_aur_packages(settings));
    }
    steps.push(remove_orphans());
    steps.push(cleanup_build());
    steps
}

fn append_to_pacman_conf(section: &str) -> StepCommand {
    StepCommand::shell(
        RunAs::Root,
        format!(
            "printf '\\n# Added by tempsystem\\n%s\\n' '{}' >> {}",
            section, PACMAN_CONF
        ),
    )
}

fn add_repository(repository: ExtraRepository) -> ProvisioningStep {
    let refresh = StepCommand::root(["pacman", "-Sy", "--noconfirm"]);
    match repository {
        ExtraRepository::ChaoticAur => ProvisioningStep::fatal(
            "add-chaotic-aur",
            "Adding the Chaotic-AUR repository",
            vec![
                StepCommand::root(["pacman-key", "--init"]),
                StepCommand::root(["pacman-key", "--populate"]),
                StepCommand::root([
                    "pacman-key",
                    "--recv-key",
                    CHAOTIC_AUR_KEY,
                    "--keyserver",
                    CHAOTIC_AUR_KEYSERVER,
                ]),
                StepCommand::root(["pacman-key", "--lsign-key", CHAOTIC_AUR_KEY]),
                StepCommand::root([
                    "pacman",
                    "-U",
                    "--needed",
                    "--noconfirm",
                    CHAOTIC_AUR_KEYRING_URL,
                    CHAOTIC_AUR_MIRRORLIST_URL,
                ]),
                append_to_pacman_conf(CHAOTIC_AUR_SECTION),
                refresh,
            ],
        ),
        ExtraRepository::Landware => ProvisioningStep::fatal(
            "add-landware",
            "Adding the landware repository",
            vec![append_to_pacman_conf(LANDWARE_SECTION), refresh],
        ),
    }
}

/// Anchored, literal search pattern for `pacman -Ssq`/`yay -Ssq` (POSIX ERE).
fn exact_name_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() + 4);
    pattern.push('^');
    for c in name.chars() {
        if matches!(c, '.' | '+') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('$');
    pattern
}

fn check_packages(packages: &PackageSet) -> ProvisioningStep {
    let mut commands = vec![StepCommand::root(["pacman", "-Sy", "--noconfirm"])];
    commands.extend(packages.names().iter().map(|name| {
        StepCommand::root(["pacman".to_string(), "-Ssq".to_string(), exact_name_pattern(name)])
            .looking_up(name.as_str())
    }));
    ProvisioningStep::fatal("check-packages", "Checking extra packages", commands)
}

fn install_base(settings: &ProvisionSettings) -> ProvisioningStep {
    let mut argv: Vec<String> = ["pacman", "-Syu", "--needed", "--noconfirm"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    argv.extend(settings.packages.union_with_base(BASE_PACKAGES));
    ProvisioningStep::fatal(
        "install-base",
        "Installing base packages",
        vec![StepCommand::root(argv)],
    )
}

fn create_user(settings: &ProvisionSettings) -> ProvisioningStep {
    let user = &settings.user;
    let home = &settings.home;
    let script = format!(
        "set -e; \
         if ! id -u {user} >/dev/null 2>&1; then useradd --create-home --user-group {user}; fi; \
         usermod --append --groups wheel {user}; \
         mkdir -p {home}; chown {user}: {home}; \
         printf '%s\\n' '%wheel ALL=(ALL:ALL) NOPASSWD: ALL' > /etc/sudoers.d/10-tempsystem; \
         chmod 0440 /etc/sudoers.d/10-tempsystem"
    );
    ProvisioningStep::fatal(
        "create-user",
        "Preparing the session user",
        vec![StepCommand::shell(RunAs::Root, script)],
    )
}

fn stage_command_not_found() -> ProvisioningStep {
    ProvisioningStep::fatal(
        "stage-command-not-found",
        "Installing the command-not-found helper",
        vec![
            StepCommand::root([
                "install",
                "-Dm644",
                STAGED_COMMAND_NOT_FOUND_PATH,
                COMMAND_NOT_FOUND_TARGET,
            ]),
            StepCommand::root(["pkgfile", "--update"]),
        ],
    )
}

fn update_pkgfile() -> ProvisioningStep {
    ProvisioningStep::fatal(
        "update-pkgfile",
        "Updating the pkgfile database",
        vec![StepCommand::root(["pkgfile", "--update"])],
    )
}

fn set_login_shell(settings: &ProvisionSettings) -> ProvisioningStep {
    ProvisioningStep::fatal(
        "set-login-shell",
        "Switching the login shell",
        vec![StepCommand::root([
            "chsh",
            "-s",
            settings.shell.as_str(),
            settings.user.as_str(),
        ])],
    )
}

fn install_framework(settings: &ProvisionSettings) -> ProvisioningStep {
    let retries = settings.fetch_retries.to_string();
    let timeout = FETCH_CONNECT_TIMEOUT_SECS.to_string();
    ProvisioningStep::fatal(
        "install-framework",
        "Installing oh-my-zsh",
        vec![
            StepCommand::user([
                "curl",
                "-fsSL",
                "--retry",
                retries.as_str(),
                "--retry-connrefused",
                "--connect-timeout",
                timeout.as_str(),
                "-o",
                FRAMEWORK_INSTALLER_PATH,
                settings.installer_url.as_str(),
            ]),
            StepCommand::user(["chmod", "+x", FRAMEWORK_INSTALLER_PATH]),
            StepCommand::user(["sh", FRAMEWORK_INSTALLER_PATH, "--unattended", "--keep-zshrc"])
                .in_dir(settings.home.as_str())
                .with_env("RUNZSH", "no")
                .with_env("CHSH", "no")
                .with_env("KEEP_ZSHRC", "yes"),
        ],
    )
    .with_cleanup(vec![StepCommand::root(["rm", "-f", FRAMEWORK_INSTALLER_PATH])])
}

fn install_plugins(settings: &ProvisionSettings) -> ProvisioningStep {
    let commands = SHELL_PLUGINS
        .iter()
        .map(|&(name, url)| {
            let target = format!(
                "{}/{}/custom/plugins/{}",
                settings.home, FRAMEWORK_DIR, name
            );
            StepCommand::user(["git", "clone", "--depth", "1", url, target.as_str()])
        })
        .collect();
    ProvisioningStep::fatal("install-plugins", "Cloning shell plugins", commands)
}

fn tune_makepkg() -> ProvisioningStep {
    let script = format!(
        "printf '%s\\n' '{}' >> {}",
        MAKEPKG_OPTIONS_LINE, MAKEPKG_CONF
    );
    ProvisioningStep::fatal(
        "tune-makepkg",
        "Tuning makepkg options",
        vec![StepCommand::shell(RunAs::Root, script)],
    )
}

fn install_aur_helper() -> ProvisioningStep {
    ProvisioningStep::fatal(
        "install-aur-helper",
        "Building and installing yay",
        vec![
            StepCommand::user(["git", "clone", "--depth", "1", AUR_HELPER_REPO, AUR_HELPER_BUILD_DIR]),
            StepCommand::user(["makepkg", "--syncdeps", "--noconfirm"]).in_dir(AUR_HELPER_BUILD_DIR),
            StepCommand::shell(
                RunAs::Root,
                format!("pacman -U --noconfirm {}/*.pkg.tar.zst", AUR_HELPER_BUILD_DIR),
            ),
        ],
    )
}

fn check_aur_packages(packages: &PackageSet) -> ProvisioningStep {
    let commands = packages
        .names()
        .iter()
        .map(|name| {
            StepCommand::user([
                AUR_HELPER_BIN.to_string(),
                "--aur".to_string(),
                "-Ssq".to_string(),
                exact_name_pattern(name),
            ])
            .looking_up(name.as_str())
        })
        .collect();
    ProvisioningStep::fatal("check-aur-packages", "Checking AUR packages", commands)
}

fn install_aur_packages(settings: &ProvisionSettings) -> ProvisioningStep {
    let mut argv: Vec<String> = [AUR_HELPER_BIN, "-S", "--needed", "--noconfirm"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    argv.extend(settings.aur_packages.names().iter().cloned());
    ProvisioningStep::fatal(
        "install-aur-packages",
        "Installing AUR packages",
        vec![StepCommand::user(argv)],
    )
}

fn remove_orphans() -> ProvisioningStep {
    // `pacman -Qdtq` exits 1 when there is nothing to remove.
    ProvisioningStep::tolerated(
        "remove-orphans",
        "Removing orphaned build dependencies",
        vec![StepCommand::shell(
            RunAs::Root,
            "pacman -Qdtq | pacman -Rns --noconfirm -",
        )],
    )
}

fn cleanup_build() -> ProvisioningStep {
    ProvisioningStep::fatal(
        "cleanup-build",
        "Removing build leftovers",
        vec![StepCommand::root(["rm", "-rf", AUR_HELPER_BUILD_DIR])],
    )
}

// --- Execution ---

/// Builds the step sequence for `settings` and runs it inside `container_id`.
pub fn provision<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    settings: &ProvisionSettings,
    cancellation_token: &CancellationToken,
) -> Result<ProvisionReport, ProvisionError> {
    let steps = build_steps(settings);
    let report = run_steps(runtime, container_id, settings, &steps, cancellation_token)?;
    for line in report.summary() {
        log::info!("{}", line);
    }
    log::info!("Provisioning took {}", format_elapsed(report.total_elapsed()));
    Ok(report)
}

/// Runs `steps` strictly in order. The first fatal failure aborts the rest.
pub fn run_steps<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    settings: &ProvisionSettings,
    steps: &[ProvisioningStep],
    cancellation_token: &CancellationToken,
) -> Result<ProvisionReport, ProvisionError> {
    let mut report = ProvisionReport::default();
    let total = steps.len();
    for (i, step) in steps.iter().enumerate() {
        println!(
            "{} {}",
            format!("[{}/{}]", i + 1, total).bold().dimmed(),
            format!("{}...", step.description).bold()
        );
        let clock = StepClock::start(step.tag);
        let outcome = run_step(runtime, container_id, settings, step, cancellation_token)?;
        report.steps.push(StepRecord {
            tag: step.tag,
            outcome,
            elapsed: clock.stop(),
        });
    }
    Ok(report)
}

fn run_step<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    settings: &ProvisionSettings,
    step: &ProvisioningStep,
    cancellation_token: &CancellationToken,
) -> Result<StepOutcome, ProvisionError> {
    let result = run_step_commands(runtime, container_id, settings, step, cancellation_token);

    // Cleanup is skipped only on interruption: the container is about to be discarded.
    if !matches!(result, Err(ProvisionError::Interrupted { .. })) {
        run_cleanup(runtime, container_id, settings, step, cancellation_token);
    }
    result
}

fn run_step_commands<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    settings: &ProvisionSettings,
    step: &ProvisioningStep,
    cancellation_token: &CancellationToken,
) -> Result<StepOutcome, ProvisionError> {
    for command in &step.commands {
        let request = exec_request(step.tag, command, settings);
        let status = runtime
            .exec(container_id, &request, cancellation_token)
            .map_err(|e| match e {
                ExecutionError::Interrupted { .. } => ProvisionError::Interrupted { step: step.tag },
                ExecutionError::Wait { .. } => ProvisionError::Wait {
                    step: step.tag,
                    source: e,
                },
                ExecutionError::Launch { .. } | ExecutionError::EmptyCommand => {
                    ProvisionError::Launch {
                        step: step.tag,
                        source: e,
                    }
                }
            })?;

        if status.success() {
            continue;
        }
        match step.policy {
            FailurePolicy::Tolerated => {
                log::warn!(
                    "Step '{}': '{}' exited with {}, tolerated.",
                    step.tag,
                    command.display(),
                    describe_code(&status.code())
                );
                println!("{}", tolerated_message(step.tag, status.code()).yellow());
                return Ok(StepOutcome::Tolerated {
                    code: status.code(),
                });
            }
            FailurePolicy::Fatal => {
                if let Some(package) = &command.looks_up {
                    return Err(ProvisionError::PackageNotFound {
                        step: step.tag,
                        package: package.clone(),
                    });
                }
                return Err(ProvisionError::CommandFailure {
                    step: step.tag,
                    command: command.display(),
                    code: status.code(),
                });
            }
        }
    }
    Ok(StepOutcome::Succeeded)
}

/// Best-effort: failures are logged and never change the step's result.
fn run_cleanup<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    settings: &ProvisionSettings,
    step: &ProvisioningStep,
    cancellation_token: &CancellationToken,
) {
    for command in &step.cleanup {
        let request = exec_request(step.tag, command, settings);
        match runtime.exec(container_id, &request, cancellation_token) {
            Ok(status) if status.success() => {}
            Ok(status) => log::warn!(
                "Cleanup of step '{}' ('{}') exited with {}.",
                step.tag,
                command.display(),
                describe_code(&status.code())
            ),
            Err(e) => {
                log::warn!("Cleanup of step '{}' failed: {}", step.tag, e);
                return;
            }
        }
    }
}

/// Turns a step command into a runtime request, resolving `RunAs` against `settings`.
pub fn exec_request(tag: &str, command: &StepCommand, settings: &ProvisionSettings) -> ExecRequest {
    let (user, mut env) = match command.run_as {
        RunAs::Root => ("root".to_string(), Vec::new()),
        RunAs::User => (
            settings.user.clone(),
            vec![
                ("HOME".to_string(), settings.home.clone()),
                ("USER".to_string(), settings.user.clone()),
            ],
        ),
    };
    env.extend(command.env.iter().cloned());
    ExecRequest {
        tag: tag.to_string(),
        user,
        workdir: command.workdir.clone(),
        env,
        argv: command.argv.clone(),
        interactive: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{Failure, MockRuntime, token};
    use crate::models::PackageSet;

    fn settings() -> ProvisionSettings {
        ProvisionSettings::for_user("tempsystem")
    }

    fn tags(steps: &[ProvisioningStep]) -> Vec<&'static str> {
        steps.iter().map(|s| s.tag).collect()
    }

    fn step<'a>(steps: &'a [ProvisioningStep], tag: &str) -> &'a ProvisioningStep {
        steps.iter().find(|s| s.tag == tag).unwrap()
    }

    #[test]
    fn test_default_step_order() {
        let steps = build_steps(&settings());
        assert_eq!(
            tags(&steps),
            vec![
                "install-base",
                "create-user",
                "set-login-shell",
                "install-framework",
                "install-plugins",
                "tune-makepkg",
                "install-aur-helper",
                "remove-orphans",
                "cleanup-build"
            ]
        );
    }

    #[test]
    fn test_staged_helper_inserts_staging_step_after_user_setup() {
        let mut settings = settings();
        settings.stage_command_not_found = true;
        let steps = build_steps(&settings);
        let tags = tags(&steps);
        assert_eq!(tags.get(2), Some(&"stage-command-not-found"));
        assert_eq!(tags.get(3), Some(&"set-login-shell"));
        assert_eq!(tags.len(), 10);
    }

    #[test]
    fn test_aur_packages_install_before_orphan_removal() {
        let mut settings = settings();
        settings.aur_packages = PackageSet::parse(["paru-bin"]).unwrap();
        let steps = build_steps(&settings);
        let tags = tags(&steps);
        let aur = tags.iter().position(|t| *t == "install-aur-packages").unwrap();
        let helper = tags.iter().position(|t| *t == "install-aur-helper").unwrap();
        let orphans = tags.iter().position(|t| *t == "remove-orphans").unwrap();
        assert!(helper < aur && aur < orphans);
    }

    #[test]
    fn test_only_orphan_removal_is_tolerated() {
        for step in build_steps(&settings()) {
            let expected = if step.tag == "remove-orphans" {
                FailurePolicy::Tolerated
            } else {
                FailurePolicy::Fatal
            };
            assert_eq!(step.policy, expected, "policy of {}", step.tag);
        }
    }

    #[test]
    fn test_install_command_contains_each_package_once() {
        let mut settings = settings();
        settings.packages = PackageSet::parse(["nodejs", "git", "nodejs"]).unwrap();
        let steps = build_steps(&settings);
        let argv = &step(&steps, "install-base").commands[0].argv;

        assert_eq!(&argv[..4], &["pacman", "-Syu", "--needed", "--noconfirm"]);
        let packages: Vec<&str> = argv[4..].iter().map(String::as_str).collect();
        let mut expected: Vec<&str> = BASE_PACKAGES.to_vec();
        expected.push("nodejs");
        assert_eq!(packages, expected);
    }

    #[test]
    fn test_empty_package_set_installs_base_list() {
        let steps = build_steps(&settings());
        let packages: Vec<&str> = steps[0].commands[0].argv[4..]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(packages, BASE_PACKAGES);
    }

    #[test]
    fn test_user_commands_carry_home_and_user() {
        let command = StepCommand::user(["git", "status"]).with_env("A", "b");
        let request = exec_request("t", &command, &settings());
        assert_eq!(request.user, "tempsystem");
        assert!(request.env.contains(&("HOME".to_string(), "/home/tempsystem".to_string())));
        assert!(request.env.contains(&("A".to_string(), "b".to_string())));

        let request = exec_request("t", &StepCommand::root(["true"]), &settings());
        assert_eq!(request.user, "root");
        assert!(request.env.is_empty());
    }

    #[test]
    fn test_successful_run_executes_every_command_in_order() {
        let runtime = MockRuntime::new();
        let report = provision(&runtime, "c1", &settings(), &token()).unwrap();

        assert_eq!(report.steps.len(), 9);
        assert_eq!(report.tags().next(), Some("install-base"));
        assert_eq!(report.summary().len(), 9);
        let tags = runtime.exec_tags();
        let framework = tags.iter().rposition(|t| t == "install-framework").unwrap();
        let plugins = tags.iter().position(|t| t == "install-plugins").unwrap();
        assert!(framework < plugins);
        assert!(runtime.execs().iter().all(|(id, _)| id == "c1"));
    }

    #[test]
    fn test_tolerated_failure_does_not_abort() {
        let runtime = MockRuntime::new().fail_exec("pacman -Qdtq", Failure::Exit(1));
        let report = provision(&runtime, "c1", &settings(), &token()).unwrap();

        assert_eq!(report.tolerated().collect::<Vec<_>>(), vec!["remove-orphans"]);
        assert_eq!(runtime.exec_tags().last().map(String::as_str), Some("cleanup-build"));
        let orphans = report
            .summary()
            .into_iter()
            .find(|line| line.starts_with("remove-orphans"))
            .unwrap();
        assert!(orphans.ends_with("(tolerated code 1)"), "{}", orphans);
    }

    #[test]
    fn test_fatal_failure_aborts_remaining_steps() {
        let runtime = MockRuntime::new().fail_exec("chsh", Failure::Exit(1));
        let err = provision(&runtime, "c1", &settings(), &token()).unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::CommandFailure { step: "set-login-shell", code: Some(1), .. }
        ));
        assert!(!runtime.exec_tags().iter().any(|t| t == "install-framework"));
    }

    #[test]
    fn test_installer_fetch_failure_still_cleans_up_and_skips_plugins() {
        let runtime = MockRuntime::new().fail_exec("curl -fsSL", Failure::Exit(7));
        let err = provision(&runtime, "c1", &settings(), &token()).unwrap_err();
        assert_eq!(err.step(), "install-framework");

        let commands = runtime.exec_lines();
        assert!(commands.iter().any(|c| c == &format!("rm -f {}", FRAMEWORK_INSTALLER_PATH)));
        assert!(!commands.iter().any(|c| c.starts_with("chmod")));
        assert!(!runtime.exec_tags().iter().any(|t| t == "install-plugins"));
    }

    #[test]
    fn test_launch_failure_is_reported_as_launch() {
        let runtime = MockRuntime::new().fail_exec("pacman -Syu", Failure::Launch);
        let err = provision(&runtime, "c1", &settings(), &token()).unwrap_err();
        assert!(matches!(err, ProvisionError::Launch { step: "install-base", .. }));
    }

    #[test]
    fn test_tolerated_message_shows_exit_code() {
        assert_eq!(
            tolerated_message("remove-orphans", Some(1)),
            "[remove-orphans] tolerated (exit code 1), continuing."
        );
        assert_eq!(
            tolerated_message("remove-orphans", None),
            "[remove-orphans] tolerated (killed by a signal), continuing."
        );
    }

    #[test]
    fn test_lost_command_is_reported_as_wait_failure() {
        let runtime = MockRuntime::new().fail_exec("chsh", Failure::Lost);
        let cancel = token();
        let err = provision(&runtime, "c1", &settings(), &cancel).unwrap_err();

        assert!(matches!(err, ProvisionError::Wait { step: "set-login-shell", .. }));
        assert!(!cancel.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_extra_repositories_come_first_and_refresh_databases() {
        let mut settings = settings();
        settings.repositories = vec![ExtraRepository::ChaoticAur, ExtraRepository::Landware];
        let steps = build_steps(&settings);
        assert_eq!(&tags(&steps)[..3], &["add-chaotic-aur", "add-landware", "install-base"]);

        for tag in ["add-chaotic-aur", "add-landware"] {
            let last = step(&steps, tag).commands.last().unwrap();
            assert_eq!(last.argv, vec!["pacman", "-Sy", "--noconfirm"]);
        }
        let chaotic = step(&steps, "add-chaotic-aur");
        assert!(chaotic.commands.iter().any(|c| c.argv.contains(&CHAOTIC_AUR_KEY.to_string())));
        let append = &step(&steps, "add-landware").commands[0].argv;
        assert!(append.last().unwrap().contains("[landware]"));
        assert!(append.last().unwrap().ends_with(">> /etc/pacman.conf"));
    }

    #[test]
    fn test_pkgfile_update_only_without_staged_helper() {
        let mut settings = settings();
        settings.update_pkgfile = true;
        let steps = build_steps(&settings);
        assert_eq!(tags(&steps).get(2), Some(&"update-pkgfile"));
        assert_eq!(
            step(&steps, "update-pkgfile").commands[0].argv,
            vec!["pkgfile", "--update"]
        );

        // The staging step already refreshes the database.
        settings.stage_command_not_found = true;
        assert!(!tags(&build_steps(&settings)).contains(&"update-pkgfile"));
    }

    #[test]
    fn test_each_extra_package_is_looked_up_exactly() {
        let mut settings = settings();
        settings.packages = PackageSet::parse(["nodejs", "gtk+"]).unwrap();
        settings.aur_packages = PackageSet::parse(["paru-bin"]).unwrap();
        let steps = build_steps(&settings);

        let tags = tags(&steps);
        let check = tags.iter().position(|t| *t == "check-packages");
        assert!(check < tags.iter().position(|t| *t == "install-base"));
        let checks = &step(&steps, "check-packages").commands;
        assert_eq!(checks[1].argv, vec!["pacman", "-Ssq", "^nodejs$"]);
        assert_eq!(checks[2].argv, vec!["pacman", "-Ssq", "^gtk\\+$"]);
        assert_eq!(checks[2].looks_up.as_deref(), Some("gtk+"));

        let aur = &step(&steps, "check-aur-packages").commands[0];
        assert_eq!(aur.run_as, RunAs::User);
        assert_eq!(aur.argv, vec!["yay", "--aur", "-Ssq", "^paru-bin$"]);
        let helper = tags.iter().position(|t| *t == "install-aur-helper");
        let check = tags.iter().position(|t| *t == "check-aur-packages");
        let install = tags.iter().position(|t| *t == "install-aur-packages");
        assert!(helper < check && check < install);
    }

    #[test]
    fn test_missing_package_names_the_package() {
        let runtime = MockRuntime::new().fail_exec("nodejs$", Failure::Exit(1));
        let mut settings = settings();
        settings.packages = PackageSet::parse(["git", "nodejs"]).unwrap();
        let err = provision(&runtime, "c1", &settings, &token()).unwrap_err();

        assert!(matches!(
            &err,
            ProvisionError::PackageNotFound { step: "check-packages", package } if package == "nodejs"
        ));
        assert!(err.to_string().contains("'nodejs' does not exist"));
        assert!(!runtime.exec_tags().iter().any(|t| t == "install-base"));
    }

    #[test]
    fn test_interruption_stops_without_cleanup() {
        let runtime = MockRuntime::new().fail_exec("sh /tmp/ohmyzsh-install.sh", Failure::Interrupt);
        let cancel = token();
        let err = provision(&runtime, "c1", &settings(), &cancel).unwrap_err();

        assert!(matches!(err, ProvisionError::Interrupted { step: "install-framework" }));
        assert!(!runtime.exec_lines().iter().any(|c| c.starts_with("rm -f")));
    }
}
