//! Installer settings.
//!
//! Defaults come from the OS and the environment; front ends and tests
//! override individual fields with the `with_*` builders.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::paths::{default_config_dir, payload_path};

/// Release asset serving the latest payload bundle.
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://github.com/replugged-org/replugged/releases/latest/download/replugged.asar";

/// Name prefix of the randomly named staging file.
pub const STAGING_PREFIX: &str = "replugged.asar.";

/// Settings shared by the patch engine and the payload downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Directory holding the payload and add-on folders.
    pub config_dir: PathBuf,

    /// Where the payload is fetched from.
    pub download_url: String,

    /// Directory the payload is staged in before relocation.
    /// `None` uses the per-OS default.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl InstallerConfig {
    /// Builds the settings for the current OS and environment.
    pub fn from_env() -> Self {
        Self {
            config_dir: default_config_dir().to_path_buf(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            staging_dir: None,
        }
    }

    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Final location of the payload bundle.
    pub fn payload_path(&self) -> PathBuf {
        payload_path(&self.config_dir)
    }

    /// Directory the staging file is created in.
    ///
    /// On Linux this is the temp directory, which is always writable by
    /// the unprivileged process; the elevated move then relocates it.
    /// Elsewhere it is the config directory so the rename stays on one
    /// filesystem. The file itself gets a random name under
    /// [`STAGING_PREFIX`].
    pub fn staging_dir(&self) -> PathBuf {
        if let Some(dir) = &self.staging_dir {
            return dir.clone();
        }
        default_staging_dir(&self.config_dir)
    }
}

fn default_staging_dir(config_dir: &Path) -> PathBuf {
    if cfg!(target_os = "linux") {
        std::env::temp_dir()
    } else {
        config_dir.to_path_buf()
    }
}
