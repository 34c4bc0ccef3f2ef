//! Per-OS routing of filesystem mutations.
//!
//! On Linux the Discord install tree is usually root-owned, so every mutation
//! goes through the privileged executor. Windows and macOS installs are
//! user-writable and use direct filesystem calls. The choice is made once by
//! OS identity, not by probing permissions.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::executor::{ElevationError, PkexecExecutor, PrivilegedCommand, PrivilegedExecutor};

/// A single filesystem mutation against `path`.
#[derive(Debug, Clone, Copy)]
pub enum FsOp<'a> {
    /// Rename `path` to `to`.
    Rename { to: &'a Path },
    /// Recursively delete `path`. A missing path is not an error.
    RemoveAll,
    /// Create `path` as a directory. The parent must exist.
    CreateDir,
    /// Create or truncate `path` with `contents`.
    WriteFile { contents: &'a [u8] },
}

impl FsOp<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::RemoveAll => "remove",
            Self::CreateDir => "mkdir",
            Self::WriteFile { .. } => "write",
        }
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Elevation(#[from] ElevationError),
}

/// Decides how filesystem mutations are carried out.
#[async_trait]
pub trait ElevationPolicy: Send + Sync {
    /// Whether mutations under `path` are routed through elevation.
    fn needs_elevation(&self, path: &Path) -> bool;

    /// Applies `op` to `path`, elevating if the policy requires it.
    async fn mutate(&self, path: &Path, op: FsOp<'_>) -> Result<(), MutationError>;
}

/// Returns the policy for the current OS.
pub fn default_policy() -> Arc<dyn ElevationPolicy> {
    if cfg!(target_os = "linux") {
        Arc::new(ElevatedPolicy::new(Arc::new(PkexecExecutor::new())))
    } else {
        Arc::new(DirectPolicy)
    }
}

// ============================================================================
// Direct Policy
// ============================================================================

/// Mutates the filesystem directly with the current user's permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPolicy;

#[async_trait]
impl ElevationPolicy for DirectPolicy {
    fn needs_elevation(&self, _path: &Path) -> bool {
        false
    }

    async fn mutate(&self, path: &Path, op: FsOp<'_>) -> Result<(), MutationError> {
        debug!(op = op.name(), path = %path.display(), "Direct filesystem mutation");

        let result = match op {
            FsOp::Rename { to } => tokio::fs::rename(path, to).await,
            FsOp::RemoveAll => remove_all(path).await,
            FsOp::CreateDir => tokio::fs::create_dir(path).await,
            FsOp::WriteFile { contents } => tokio::fs::write(path, contents).await,
        };

        result.map_err(|source| MutationError::Io {
            op: op.name(),
            path: path.to_path_buf(),
            source,
        })
    }
}

async fn remove_all(path: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

// ============================================================================
// Elevated Policy
// ============================================================================

/// Routes every mutation through a [`PrivilegedExecutor`].
#[derive(Clone)]
pub struct ElevatedPolicy {
    executor: Arc<dyn PrivilegedExecutor>,
}

impl ElevatedPolicy {
    pub fn new(executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self { executor }
    }

    /// Builds the structured command for an operation.
    fn command_for(path: &Path, op: FsOp<'_>) -> PrivilegedCommand {
        match op {
            FsOp::Rename { to } => PrivilegedCommand::new("mv")
                .arg("-f")
                .arg("-T")
                .arg("--")
                .arg(path)
                .arg(to),
            FsOp::RemoveAll => PrivilegedCommand::new("rm").arg("-rf").arg("--").arg(path),
            FsOp::CreateDir => PrivilegedCommand::new("mkdir").arg("--").arg(path),
            FsOp::WriteFile { contents } => PrivilegedCommand::new("tee")
                .arg("--")
                .arg(path)
                .stdin(contents)
                .discard_stdout(),
        }
    }
}

#[async_trait]
impl ElevationPolicy for ElevatedPolicy {
    fn needs_elevation(&self, _path: &Path) -> bool {
        true
    }

    async fn mutate(&self, path: &Path, op: FsOp<'_>) -> Result<(), MutationError> {
        let command = Self::command_for(path, op);
        self.executor.run(&command).await?;
        Ok(())
    }
}
