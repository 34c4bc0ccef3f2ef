//! Configuration module for the Replugged installer.
//!
//! Resolves the per-user configuration directory and holds installer settings.

mod paths;
mod settings;

pub use paths::{
    default_config_dir, ensure_config_dir, payload_path, CONFIG_DIR_ENV, CONFIG_FOLDER_NAMES,
    PAYLOAD_FILE_NAME,
};
pub use settings::{InstallerConfig, DEFAULT_DOWNLOAD_URL, STAGING_PREFIX};
