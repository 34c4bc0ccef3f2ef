//! Test double for [`PrivilegedExecutor`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

use super::executor::{CommandOutput, ElevationError, PrivilegedCommand, PrivilegedExecutor};

/// Applies `mv`/`rm`/`mkdir`/`tee` commands to the local filesystem without
/// elevating, recording each call. Can deny every call from the N-th (0-based).
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<PrivilegedCommand>>,
    deny_from: Option<usize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_from(mut self, call_index: usize) -> Self {
        self.deny_from = Some(call_index);
        self
    }

    /// Programs invoked so far, including denied ones.
    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    fn apply(command: &PrivilegedCommand) -> std::io::Result<()> {
        let paths: Vec<PathBuf> = command
            .args
            .iter()
            .filter(|a| !a.to_string_lossy().starts_with('-'))
            .map(PathBuf::from)
            .collect();

        match (command.program.as_str(), paths.as_slice()) {
            ("mv", [from, to]) => std::fs::rename(from, to),
            ("rm", [path]) => match std::fs::symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
                Ok(_) => std::fs::remove_file(path),
                Err(_) => Ok(()),
            },
            ("mkdir", [path]) => std::fs::create_dir(path),
            ("tee", [path]) => std::fs::write(path, command.stdin.as_deref().unwrap_or_default()),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                command.display(),
            )),
        }
    }
}

#[async_trait]
impl PrivilegedExecutor for ScriptedExecutor {
    async fn run(&self, command: &PrivilegedCommand) -> Result<CommandOutput, ElevationError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(command.clone());
            calls.len() - 1
        };

        if self.deny_from.is_some_and(|n| index >= n) {
            return Err(ElevationError::Denied {
                command: command.display(),
            });
        }

        Self::apply(command).map_err(|e| ElevationError::Failed {
            command: command.display(),
            status: 1,
            stderr: e.to_string(),
        })?;

        Ok(CommandOutput::default())
    }
}
