use std::{
    io::{self, Write},
    path::Path,
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use tracing::debug;

use crate::error::{Result, VaultError};

const EXEC_BUSY_RETRY_ATTEMPTS: usize = 20;
const EXEC_BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status code.
    pub status_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the command exited with status zero.
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// Trimmed stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            return self.stdout.trim().to_owned();
        }
        stderr.to_owned()
    }
}

/// Runs `binary` with `args`, optionally writing `stdin` bytes, and captures output.
pub fn run_captured(
    binary: &str,
    args: &[&str],
    current_dir: Option<&Path>,
    stdin: Option<&[u8]>,
) -> Result<CommandOutput> {
    debug!(binary, ?args, "running external command");
    let output = retry_exec_busy(|| {
        let mut command = Command::new(binary);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(directory) = current_dir {
            command.current_dir(directory);
        }
        if stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command.spawn()?;
        if let Some(bytes) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                match handle.write_all(bytes).and_then(|_| handle.flush()) {
                    Ok(()) => {}
                    Err(error) if error.kind() == io::ErrorKind::BrokenPipe => {}
                    Err(error) => return Err(error),
                }
            }
        }
        child.wait_with_output()
    })
    .map_err(|error| map_command_execution_error(binary, error))?;

    Ok(CommandOutput {
        status_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Maps a spawn failure to a descriptive error.
pub fn map_command_execution_error(binary: &str, error: io::Error) -> VaultError {
    if error.kind() == io::ErrorKind::NotFound {
        return VaultError::InvalidInput(format!("required binary not found: {binary}"));
    }
    VaultError::Io(error)
}

/// Returns `true` when `error` was produced by a missing binary.
pub fn is_missing_binary(error: &VaultError) -> bool {
    matches!(error, VaultError::InvalidInput(message) if message.starts_with("required binary not found"))
}

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
