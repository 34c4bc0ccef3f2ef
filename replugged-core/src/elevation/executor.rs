//! Running commands with elevated privileges.
//!
//! Commands are always passed as a program plus an argv list. Nothing is ever
//! interpolated into a shell string, so paths containing spaces or quotes
//! reach the target program unchanged.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// pkexec: the authorization dialog was dismissed.
const PKEXEC_DISMISSED: i32 = 126;
/// pkexec: not authorized, or authentication failed.
const PKEXEC_NOT_AUTHORIZED: i32 = 127;

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("Elevation denied for `{command}`")]
    Denied { command: String },
    #[error("Elevated command `{command}` failed with status {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A command to run with elevated privileges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedCommand {
    pub program: String,
    pub args: Vec<OsString>,
    /// Bytes fed to the command's stdin, if any.
    pub stdin: Option<Vec<u8>>,
    /// Send stdout to the null device instead of capturing it.
    pub discard_stdout: bool,
}

impl PrivilegedCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            discard_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn stdin(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(contents.into());
        self
    }

    pub fn discard_stdout(mut self) -> Self {
        self.discard_stdout = true;
        self
    }

    /// Human-readable rendering for logs and error messages.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

/// Captured result of a successful elevated command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs commands with elevated privileges.
///
/// May prompt the user interactively. A denied prompt or a non-zero exit is an
/// error; the call returns only once the process has exited.
#[async_trait]
pub trait PrivilegedExecutor: Send + Sync {
    async fn run(&self, command: &PrivilegedCommand) -> Result<CommandOutput, ElevationError>;
}

/// Executor that wraps every command in `pkexec`.
#[derive(Debug, Clone)]
pub struct PkexecExecutor {
    launcher: String,
}

impl Default for PkexecExecutor {
    fn default() -> Self {
        Self {
            launcher: "pkexec".to_string(),
        }
    }
}

impl PkexecExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrivilegedExecutor for PkexecExecutor {
    async fn run(&self, command: &PrivilegedCommand) -> Result<CommandOutput, ElevationError> {
        let rendered = command.display();
        info!(command = %rendered, "Running elevated command");

        let mut cmd = Command::new(&self.launcher);
        cmd.arg(&command.program).args(&command.args);
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(if command.discard_stdout {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ElevationError::Spawn {
            program: self.launcher.clone(),
            source,
        })?;

        if let (Some(contents), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            // A write error here means the child exited early; its status says why.
            if let Err(e) = stdin.write_all(contents).await {
                debug!("Failed to write stdin for `{}`: {}", rendered, e);
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ElevationError::Spawn {
                program: self.launcher.clone(),
                source,
            })?;

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match status {
            0 => Ok(CommandOutput {
                status,
                stdout,
                stderr,
            }),
            PKEXEC_DISMISSED | PKEXEC_NOT_AUTHORIZED => {
                warn!(command = %rendered, status, "Elevation denied");
                Err(ElevationError::Denied { command: rendered })
            }
            _ => {
                warn!(command = %rendered, status, "Elevated command failed");
                Err(ElevationError::Failed {
                    command: rendered,
                    status,
                    stderr: stderr.trim().to_string(),
                })
            }
        }
    }
}
