use std::{
    io,
    path::Path,
    process::{Command, ExitStatus},
    thread,
    time::Duration,
};

use crate::error::{AuthError, Result};

const EXEC_BUSY_RETRY_ATTEMPTS: usize = 20;
const EXEC_BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Output captured from one external command.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Exit status code, `-1` when killed by a signal.
    pub status_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// Executor abstraction for external commands.
pub trait ProcessRunner: Send + Sync {
    /// Runs `argv` with inherited stdio and fails unless it exits with status 0.
    fn run(&self, argv: &[String]) -> Result<()>;
    /// Runs `argv` with piped stdio and returns whatever it produced.
    fn capture(&self, argv: &[String]) -> Result<CapturedOutput>;
}

/// Real runner backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    /// Creates a system runner.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String]) -> Result<()> {
        let (program, args) = split_argv(argv)?;
        tracing::debug!(%program, ?args, "spawning command");
        let status = retry_exec_busy(|| Command::new(program).args(args).status())
            .map_err(|error| map_command_execution_error(program, error))?;
        if status.success() {
            return Ok(());
        }
        Err(AuthError::ExternalTool {
            program: program.to_owned(),
            status: status_code(status),
            stderr: String::new(),
        })
    }

    fn capture(&self, argv: &[String]) -> Result<CapturedOutput> {
        let (program, args) = split_argv(argv)?;
        tracing::debug!(%program, ?args, "spawning command with captured output");
        let output = retry_exec_busy(|| Command::new(program).args(args).output())
            .map_err(|error| map_command_execution_error(program, error))?;
        Ok(CapturedOutput {
            status_code: status_code(output.status),
            stdout: String::from_utf8(output.stdout)?,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Returns `true` when `binary` resolves to an executable file.
///
/// Names containing a path separator are checked directly; bare names are
/// searched for in `PATH`.
pub fn is_binary_available(binary: &str) -> bool {
    let candidate = Path::new(binary);
    if candidate
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty())
    {
        return is_executable_file(candidate);
    }

    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    for directory in std::env::split_paths(&path_var) {
        if is_executable_file(&directory.join(binary)) {
            return true;
        }
        #[cfg(windows)]
        {
            for suffix in [".exe", ".cmd", ".bat"] {
                if is_executable_file(&directory.join(format!("{binary}{suffix}"))) {
                    return true;
                }
            }
        }
    }
    false
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

fn split_argv(argv: &[String]) -> Result<(&str, &[String])> {
    match argv.split_first() {
        Some((program, args)) if !program.is_empty() => Ok((program.as_str(), args)),
        _ => Err(AuthError::InvalidInput(
            "command must name a program".to_owned(),
        )),
    }
}

fn status_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Retries a spawn that raced with a writer still holding the executable open.
fn retry_exec_busy<T, F>(mut operation: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut last_error = None;
    for attempt in 0..EXEC_BUSY_RETRY_ATTEMPTS {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if is_exec_busy_error(&error) && attempt + 1 < EXEC_BUSY_RETRY_ATTEMPTS => {
                last_error = Some(error);
                thread::sleep(EXEC_BUSY_RETRY_DELAY);
            }
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::other("command execution failed")))
}

fn is_exec_busy_error(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::ExecutableFileBusy || error.raw_os_error() == Some(26)
}

fn map_command_execution_error(binary: &str, error: io::Error) -> AuthError {
    if error.kind() == io::ErrorKind::NotFound {
        return AuthError::Configuration(format!("required binary not found: {binary}"));
    }
    AuthError::Io(error)
}
