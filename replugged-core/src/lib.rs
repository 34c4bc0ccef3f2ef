//! Replugged Core Library
//!
//! This crate provides the core functionality for the Replugged installer,
//! which plugs the Replugged client mod into a Discord installation. It
//! includes:
//!
//! - Discord installation detection for each release channel
//! - The plug/unplug state machine swapping `app.asar` for a loader stub
//! - Privileged execution for installs the current user cannot write to
//! - Payload download with progress reporting
//! - Configuration directory management

pub mod config;
pub mod download;
pub mod elevation;
pub mod inject;

// Re-export config
pub use config::{default_config_dir, ensure_config_dir, InstallerConfig, DEFAULT_DOWNLOAD_URL};

// Re-export download
pub use download::{
    download_channel, DownloadError, DownloadEvent, DownloadProgress, DownloadReceiver,
    DownloadSender, PayloadDownloader, PROGRESS_INDETERMINATE,
};

// Re-export elevation
pub use elevation::{
    default_policy, DirectPolicy, ElevatedPolicy, ElevationError, ElevationPolicy,
    PkexecExecutor, PrivilegedExecutor,
};

// Re-export inject
pub use inject::{
    Installation, InstallationProbe, PatchEngine, PatchError, PathResolver, Platform,
    StaticPathResolver, SystemPathResolver,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
