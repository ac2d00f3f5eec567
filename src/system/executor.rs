// src/system/executor.rs

use crate::CancellationToken;
use colored::Colorize;
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};

/// Interval between two checks of a running child and the cancellation flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{command}' could not be started: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Lost track of command '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command '{command}' was interrupted.")]
    Interrupted { command: String },
}

/// Exit status of a command that ran. `code` is `None` when a signal ended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    code: Option<i32>,
    signal: Option<i32>,
}

impl CommandStatus {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl From<ExitStatus> for CommandStatus {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = status.signal();
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Whether the user asked the process to stop.
pub fn is_cancelled(cancellation_token: &CancellationToken) -> bool {
    cancellation_token.load(Ordering::SeqCst)
}

/// Renders `program args...` the way a user would type it.
pub fn render_command_line<S: AsRef<str>>(program: &OsStr, args: &[S]) -> String {
    let program = program.to_string_lossy();
    let words =
        std::iter::once(&*program).chain(args.iter().map(AsRef::<str>::as_ref));
    shlex::try_join(words).unwrap_or_else(|_| {
        let mut line = program.to_string();
        for arg in args {
            let arg: &str = arg.as_ref();
            line.push(' ');
            line.push_str(arg);
        }
        line
    })
}

/// Prints the tagged command line before it runs.
fn echo_command(tag: &str, command_line: &str) {
    log::debug!("[{}] spawning: {}", tag, command_line);
    println!(
        "{} {} {}",
        format!("[{}]", tag).dimmed(),
        "→".blue(),
        command_line.green()
    );
}

fn build_command<S: AsRef<str>>(program: &OsStr, args: &[S]) -> StdCommand {
    let mut command = StdCommand::new(program);
    for arg in args {
        let arg: &str = arg.as_ref();
        command.arg(arg);
    }
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    command
}

/// Runs one external command with inherited stdio and returns its exit status untouched.
///
/// A command that cannot be started is an `ExecutionError::Launch`; a command that ran and
/// exited non-zero is a successful call returning a failed `CommandStatus`. While the
/// child runs, the cancellation flag is polled; once raised the child is killed and
/// `ExecutionError::Interrupted` is returned.
pub fn run<P, S>(
    tag: &str,
    program: P,
    args: &[S],
    cancellation_token: &CancellationToken,
) -> Result<CommandStatus, ExecutionError>
where
    P: AsRef<OsStr>,
    S: AsRef<str>,
{
    let program = program.as_ref();
    if program.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let command_line = render_command_line(program, args);
    if is_cancelled(cancellation_token) {
        return Err(ExecutionError::Interrupted {
            command: command_line,
        });
    }

    echo_command(tag, &command_line);
    let child = build_command(program, args)
        .spawn()
        .map_err(|e| ExecutionError::Launch {
            command: command_line.clone(),
            source: e,
        })?;

    let status = wait_with_cancellation(child, &command_line, cancellation_token)?;
    log::debug!("[{}] exited with {:?}", tag, status);
    Ok(status.into())
}

/// Same as [`run`], but captures standard output instead of passing it through.
/// Standard error still reaches the terminal.
pub fn run_captured<P, S>(
    tag: &str,
    program: P,
    args: &[S],
    cancellation_token: &CancellationToken,
) -> Result<(CommandStatus, String), ExecutionError>
where
    P: AsRef<OsStr>,
    S: AsRef<str>,
{
    let program = program.as_ref();
    if program.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let command_line = render_command_line(program, args);
    if is_cancelled(cancellation_token) {
        return Err(ExecutionError::Interrupted {
            command: command_line,
        });
    }

    echo_command(tag, &command_line);
    let mut child = build_command(program, args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| ExecutionError::Launch {
            command: command_line.clone(),
            source: e,
        })?;

    // Drain stdout on its own thread so a chatty child cannot block on a full pipe.
    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            stdout.read_to_end(&mut buffer).map(|_| buffer)
        })
    });

    let status = wait_with_cancellation(child, &command_line, cancellation_token)?;

    let output = match reader {
        Some(handle) => match handle.join() {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Err(e)) => {
                return Err(ExecutionError::Wait {
                    command: command_line,
                    source: e,
                });
            }
            Err(_) => String::new(),
        },
        None => String::new(),
    };

    Ok((status.into(), output))
}

/// Runs a command that must finish even while the process is shutting down.
///
/// The cancellation flag is ignored and, on Unix, the child is placed in its own process
/// group so a terminal Ctrl+C aimed at us does not reach it.
pub fn run_shielded<P, S>(tag: &str, program: P, args: &[S]) -> Result<CommandStatus, ExecutionError>
where
    P: AsRef<OsStr>,
    S: AsRef<str>,
{
    let program = program.as_ref();
    if program.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let command_line = render_command_line(program, args);
    echo_command(tag, &command_line);

    let mut command = build_command(program, args);
    command.stdin(Stdio::null());
    #[cfg(unix)]
    command.process_group(0);

    let status = command.status().map_err(|e| ExecutionError::Launch {
        command: command_line,
        source: e,
    })?;
    Ok(status.into())
}

/// Non-blocking wait loop that allows for cancellation.
fn wait_with_cancellation(
    mut child: Child,
    command_line: &str,
    cancellation_token: &CancellationToken,
) -> Result<ExitStatus, ExecutionError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                // A terminal Ctrl+C reaches the child too; report that as an interruption
                // rather than as an ordinary failure.
                if is_cancelled(cancellation_token) {
                    return Err(ExecutionError::Interrupted {
                        command: command_line.to_string(),
                    });
                }
                return Ok(status);
            }
            Ok(None) => {
                if is_cancelled(cancellation_token) {
                    log::debug!(
                        "Cancellation requested, killing child process (PID: {})...",
                        child.id()
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    child.wait().ok();
                    return Err(ExecutionError::Interrupted {
                        command: command_line.to_string(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(ExecutionError::Wait {
                    command: command_line.to_string(),
                    source: e,
                });
            }
        }
    }
}
