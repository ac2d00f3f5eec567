// src/core/test_support.rs

//! A recording `ContainerRuntime` for provisioning and session tests.

use crate::{
    CancellationToken,
    models::{ContainerSpec, ExecRequest},
    system::{
        executor::{CommandStatus, ExecutionError},
        runtime::{ContainerRuntime, RuntimeError},
    },
};
use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const MOCK_CONTAINER_ID: &str = "c0ffee";

pub(crate) fn token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// How a matching exec call should fail.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    /// The command runs and exits with this code.
    Exit(i32),
    /// The command cannot be started.
    Launch,
    /// A signal arrives while the command runs.
    Interrupt,
    /// The command starts but waiting on it fails.
    Lost,
}

impl Failure {
    fn into_error(self, command: String, cancellation_token: &CancellationToken) -> ExecutionError {
        match self {
            Failure::Launch => ExecutionError::Launch {
                command,
                source: io::Error::new(io::ErrorKind::NotFound, "mock launch failure"),
            },
            Failure::Lost => ExecutionError::Wait {
                command,
                source: io::Error::other("mock wait failure"),
            },
            // `Exit` is turned into a status by the callers before reaching here.
            Failure::Interrupt | Failure::Exit(_) => {
                cancellation_token.store(true, Ordering::SeqCst);
                ExecutionError::Interrupted { command }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create(ContainerSpec),
    CopyIn {
        container_id: String,
        host_path: PathBuf,
        container_path: String,
    },
    Exec {
        container_id: String,
        request: ExecRequest,
    },
    Remove(String),
}

#[derive(Debug, Default)]
pub(crate) struct MockRuntime {
    calls: RefCell<Vec<Call>>,
    exec_failures: Vec<(String, Failure)>,
    create_failure: Option<Failure>,
    fail_copy: bool,
    fail_remove: bool,
    session_exit: i32,
}

impl MockRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fails every exec whose rendered command line contains `pattern`.
    pub(crate) fn fail_exec(mut self, pattern: &str, failure: Failure) -> Self {
        self.exec_failures.push((pattern.to_string(), failure));
        self
    }

    /// Fails `create`. `Failure::Exit` makes the runtime report that exit code.
    pub(crate) fn fail_create(mut self, failure: Failure) -> Self {
        self.create_failure = Some(failure);
        self
    }

    pub(crate) fn fail_copy(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    pub(crate) fn fail_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    /// Exit code returned by interactive execs.
    pub(crate) fn session_exit(mut self, code: i32) -> Self {
        self.session_exit = code;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn execs(&self) -> Vec<(String, ExecRequest)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Exec {
                    container_id,
                    request,
                } => Some((container_id.clone(), request.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn exec_tags(&self) -> Vec<String> {
        self.execs().into_iter().map(|(_, r)| r.tag).collect()
    }

    pub(crate) fn exec_lines(&self) -> Vec<String> {
        self.execs()
            .iter()
            .map(|(_, r)| render(&r.argv))
            .collect()
    }

    pub(crate) fn removed(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Remove(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

fn render(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

impl ContainerRuntime for MockRuntime {
    fn create(
        &self,
        spec: &ContainerSpec,
        cancellation_token: &CancellationToken,
    ) -> Result<String, RuntimeError> {
        self.calls.borrow_mut().push(Call::Create(spec.clone()));
        match self.create_failure {
            None => Ok(MOCK_CONTAINER_ID.to_string()),
            Some(Failure::Exit(code)) => Err(RuntimeError::Failed {
                operation: "create the container",
                code: Some(code),
            }),
            Some(failure) => Err(RuntimeError::Execution(
                failure.into_error(format!("create {}", spec.name), cancellation_token),
            )),
        }
    }

    fn copy_file_in(
        &self,
        container_id: &str,
        host_path: &Path,
        container_path: &str,
        _cancellation_token: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        self.calls.borrow_mut().push(Call::CopyIn {
            container_id: container_id.to_string(),
            host_path: host_path.to_path_buf(),
            container_path: container_path.to_string(),
        });
        if self.fail_copy {
            return Err(RuntimeError::Failed {
                operation: "copy a file into the container",
                code: Some(1),
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
        self.calls.borrow_mut().push(Call::Exec {
            container_id: container_id.to_string(),
            request: request.clone(),
        });
        let line = render(&request.argv);
        if cancellation_token.load(Ordering::SeqCst) {
            return Err(ExecutionError::Interrupted { command: line });
        }

        let failure = self
            .exec_failures
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, failure)| *failure);
        match failure {
            Some(Failure::Exit(code)) => Ok(CommandStatus::from_code(code)),
            Some(failure) => Err(failure.into_error(line, cancellation_token)),
            None if request.interactive => Ok(CommandStatus::from_code(self.session_exit)),
            None => Ok(CommandStatus::from_code(0)),
        }
    }

    fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.calls
            .borrow_mut()
            .push(Call::Remove(container_id.to_string()));
        if self.fail_remove {
            return Err(RuntimeError::Failed {
                operation: "remove the container",
                code: Some(1),
            });
        }
        Ok(())
    }
}
