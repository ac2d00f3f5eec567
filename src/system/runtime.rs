// src/system/runtime.rs

use crate::{
    CancellationToken,
    constants::RUNTIME_CANDIDATES,
    models::{ContainerSpec, ExecRequest},
    system::executor::{self, CommandStatus, ExecutionError},
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Container runtime failed to {operation} (exit code {code:?}).")]
    Failed {
        operation: &'static str,
        code: Option<i32>,
    },
    #[error("Container runtime did not report a container id.")]
    MissingContainerId,
    #[error("No container runtime found in PATH (looked for: {}).", RUNTIME_CANDIDATES.join(", "))]
    RuntimeNotFound,
    #[error("Container runtime '{0}' not found in PATH.")]
    UnknownRuntime(String),
}

impl RuntimeError {
    /// Whether the failure was caused by the user interrupting the process.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::Interrupted { .. })
        )
    }

    /// Whether the runtime process started, so a failed `create` may still have left a
    /// container behind.
    pub fn may_have_created(&self) -> bool {
        !matches!(
            self,
            Self::Execution(ExecutionError::EmptyCommand | ExecutionError::Launch { .. })
                | Self::RuntimeNotFound
                | Self::UnknownRuntime(_)
        )
    }
}

/// The four capabilities the session needs from a container runtime.
pub trait ContainerRuntime {
    /// Creates and starts a container, returning its identifier.
    fn create(
        &self,
        spec: &ContainerSpec,
        cancellation_token: &CancellationToken,
    ) -> Result<String, RuntimeError>;

    /// Copies one host file to `container_path` inside the container.
    fn copy_file_in(
        &self,
        container_id: &str,
        host_path: &Path,
        container_path: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<(), RuntimeError>;

    /// Runs a command inside the container with passthrough stdio and returns its status.
    fn exec(
        &self,
        container_id: &str,
        request: &ExecRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<CommandStatus, ExecutionError>;

    /// Removes the container and its anonymous volumes. Must work while shutting down.
    fn remove(&self, container_id: &str) -> Result<(), RuntimeError>;
}

/// A `ContainerRuntime` driving the `docker` or `podman` command-line client.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    program: PathBuf,
}

impl CliRuntime {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolves a runtime selection: `auto` searches `PATH` for podman then docker, a bare
    /// name is looked up in `PATH`, anything containing a separator is used as a path.
    pub fn detect(selection: &str) -> Result<Self, RuntimeError> {
        if selection == "auto" {
            return RUNTIME_CANDIDATES
                .iter()
                .find_map(|name| which::which(name).ok())
                .map(Self::new)
                .ok_or(RuntimeError::RuntimeNotFound);
        }
        if selection.contains(std::path::MAIN_SEPARATOR) {
            return Ok(Self::new(selection));
        }
        which::which(selection)
            .map(Self::new)
            .map_err(|_| RuntimeError::UnknownRuntime(selection.to_string()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments of the `run` invocation that creates the session container.
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--detach".into(),
            "--interactive".into(),
            "--tty".into(),
            "--name".into(),
            spec.name.clone(),
            "--hostname".into(),
            spec.hostname.clone(),
        ];
        for server in &spec.dns {
            args.push("--dns".into());
            args.push(server.clone());
        }
        if spec.privileged {
            args.push("--privileged".into());
        }
        for mount in &spec.mounts {
            let mut volume = format!("{}:{}", mount.host.display(), mount.target);
            if mount.read_only {
                volume.push_str(":ro");
            }
            args.push("--volume".into());
            args.push(volume);
        }
        args.push(spec.image.clone());
        args
    }

    /// Arguments of the `exec` invocation for `request`.
    pub fn exec_args(container_id: &str, request: &ExecRequest) -> Vec<String> {
        let mut args: Vec<String> = vec!["exec".into()];
        if request.interactive {
            args.push("--interactive".into());
            args.push("--tty".into());
        }
        args.push("--user".into());
        args.push(request.user.clone());
        if let Some(dir) = &request.workdir {
            args.push("--workdir".into());
            args.push(dir.clone());
        }
        for (key, value) in &request.env {
            args.push("--env".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(container_id.to_string());
        args.extend(request.argv.iter().cloned());
        args
    }
}

impl ContainerRuntime for CliRuntime {
    fn create(
        &self,
        spec: &ContainerSpec,
        cancellation_token: &CancellationToken,
    ) -> Result<String, RuntimeError> {
        let args = Self::create_args(spec);
        let (status, output) =
            executor::run_captured("create", &self.program, &args, cancellation_token)?;
        if !status.success() {
            return Err(RuntimeError::Failed {
                operation: "create the container",
                code: status.code(),
            });
        }
        // Pull progress goes to stderr; the id is the last line on stdout.
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string)
            .ok_or(RuntimeError::MissingContainerId)
    }

    fn copy_file_in(
        &self,
        container_id: &str,
        host_path: &Path,
        container_path: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let args = [
            "cp".to_string(),
            host_path.display().to_string(),
            format!("{}:{}", container_id, container_path),
        ];
        let status = executor::run("stage", &self.program, &args, cancellation_token)?;
        if !status.success() {
            return Err(RuntimeError::Failed {
                operation: "copy a file into the container",
                code: status.code(),
            });
        }
        Ok(())
    }

    fn exec(
        &self,
        container_id: &str,
        request: &ExecRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<CommandStatus, ExecutionError> {
        let args = Self::exec_args(container_id, request);
        executor::run(&request.tag, &self.program, &args, cancellation_token)
    }

    fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        let args = ["rm", "--force", "--volumes", container_id];
        let status = executor::run_shielded("teardown", &self.program, &args)?;
        if !status.success() {
            return Err(RuntimeError::Failed {
                operation: "remove the container",
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mount;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "tempsystem-0badc0de".to_string(),
            image: "archlinux:latest".to_string(),
            hostname: "tempsystem".to_string(),
            dns: vec!["1.1.1.1".to_string()],
            privileged: false,
            mounts: Vec::new(),
        }
    }

    #[test]
    fn test_only_unstarted_creates_cannot_leave_a_container() {
        let launch = RuntimeError::Execution(ExecutionError::Launch {
            command: "docker run".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        });
        assert!(!launch.may_have_created());
        assert!(!RuntimeError::RuntimeNotFound.may_have_created());

        let interrupted = RuntimeError::Execution(ExecutionError::Interrupted {
            command: "docker run".to_string(),
        });
        assert!(interrupted.may_have_created());
        assert!(RuntimeError::MissingContainerId.may_have_created());
        assert!(
            RuntimeError::Failed {
                operation: "create the container",
                code: Some(125),
            }
            .may_have_created()
        );
    }

    #[test]
    fn test_create_args_end_with_image() {
        let args = CliRuntime::create_args(&spec());
        assert_eq!(args.first().map(String::as_str), Some("run"));
        assert_eq!(args.last().map(String::as_str), Some("archlinux:latest"));
        assert!(args.windows(2).any(|w| w == ["--name", "tempsystem-0badc0de"]));
        assert!(args.windows(2).any(|w| w == ["--dns", "1.1.1.1"]));
        assert!(!args.contains(&"--privileged".to_string()));
    }

    #[test]
    fn test_create_args_mounts_and_privileges() {
        let mut spec = spec();
        spec.privileged = true;
        spec.mounts.push(Mount {
            host: PathBuf::from("/srv/project"),
            target: "/home/tempsystem/work".to_string(),
            read_only: true,
        });
        let args = CliRuntime::create_args(&spec);
        assert!(args.contains(&"--privileged".to_string()));
        assert!(
            args.windows(2)
                .any(|w| w == ["--volume", "/srv/project:/home/tempsystem/work:ro"])
        );
    }

    #[test]
    fn test_exec_args_place_options_before_container() {
        let request = ExecRequest {
            tag: "install-plugins".to_string(),
            user: "tempsystem".to_string(),
            workdir: Some("/tmp/yay-build".to_string()),
            env: vec![("RUNZSH".to_string(), "no".to_string())],
            argv: vec!["makepkg".to_string(), "--syncdeps".to_string()],
            interactive: false,
        };
        let args = CliRuntime::exec_args("abc123", &request);
        assert_eq!(
            args,
            vec![
                "exec",
                "--user",
                "tempsystem",
                "--workdir",
                "/tmp/yay-build",
                "--env",
                "RUNZSH=no",
                "abc123",
                "makepkg",
                "--syncdeps"
            ]
        );
    }

    #[test]
    fn test_interactive_exec_allocates_tty() {
        let request = ExecRequest {
            tag: "session".to_string(),
            user: "tempsystem".to_string(),
            workdir: None,
            env: Vec::new(),
            argv: vec!["/usr/bin/zsh".to_string(), "-l".to_string()],
            interactive: true,
        };
        let args = CliRuntime::exec_args("abc123", &request);
        assert_eq!(args.get(1).map(String::as_str), Some("--interactive"));
        assert_eq!(args.get(2).map(String::as_str), Some("--tty"));
    }

    #[test]
    fn test_detect_accepts_explicit_path() {
        let runtime = CliRuntime::detect("/opt/bin/docker").unwrap();
        assert_eq!(runtime.program(), Path::new("/opt/bin/docker"));
    }

    #[test]
    fn test_detect_unknown_runtime() {
        let result = CliRuntime::detect("no-such-runtime-tempsystem");
        assert!(matches!(result, Err(RuntimeError::UnknownRuntime(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_create_reads_container_id_from_stdout() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool;

        // `echo` prints its arguments, so the "id" is the echoed image name.
        let runtime = CliRuntime::new("echo");
        let token = Arc::new(AtomicBool::new(false));
        let id = runtime.create(&spec(), &token).unwrap();
        assert!(id.ends_with("archlinux:latest"));
    }
}
