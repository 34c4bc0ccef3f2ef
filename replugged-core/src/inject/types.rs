//! Core types for Discord installation state.
//!
//! This module defines the release channel identifiers, the point-in-time
//! installation snapshot, and the on-disk bundle layout shared by the probe
//! and the patch engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Bundle Layout
// ============================================================================

/// File name of the active startup bundle.
pub const ACTIVE_BUNDLE_NAME: &str = "app.asar";

/// File name the original bundle is moved to while plugged.
pub const ORIGINAL_BUNDLE_NAME: &str = "app.orig.asar";

/// Manifest written into the loader stub.
pub const STUB_MANIFEST_NAME: &str = "package.json";

/// Entry script written into the loader stub.
pub const STUB_ENTRY_NAME: &str = "index.js";

/// Substring marking a flatpak-confined installation.
pub const SANDBOX_MARKER: &str = "flatpak";

/// Returns the directory holding the active bundle (`resources/`).
pub fn installation_root(app_dir: &Path) -> Option<&Path> {
    app_dir.parent()
}

/// Returns the sibling path where the original bundle is preserved.
pub fn original_bundle_path(app_dir: &Path) -> PathBuf {
    match installation_root(app_dir) {
        Some(root) => root.join(ORIGINAL_BUNDLE_NAME),
        None => PathBuf::from(ORIGINAL_BUNDLE_NAME),
    }
}

/// Returns true if the path points into a sandboxed installation.
pub fn is_sandboxed(app_dir: &Path) -> bool {
    app_dir.to_string_lossy().contains(SANDBOX_MARKER)
}

// ============================================================================
// Platform
// ============================================================================

/// A Discord release channel that can be patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// The stable release.
    Stable,
    /// Public Test Build.
    Ptb,
    /// Canary (nightly) build.
    Canary,
    /// Internal development build.
    Development,
}

impl Platform {
    /// Returns all known platforms.
    pub fn all() -> &'static [Platform] {
        &[Self::Stable, Self::Ptb, Self::Canary, Self::Development]
    }

    /// Returns the lowercase string identifier for this platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Ptb => "ptb",
            Self::Canary => "canary",
            Self::Development => "development",
        }
    }

    /// Returns the human-readable product name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Stable => "Discord",
            Self::Ptb => "Discord PTB",
            Self::Canary => "Discord Canary",
            Self::Development => "Discord Development",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" | "discord" => Ok(Self::Stable),
            "ptb" => Ok(Self::Ptb),
            "canary" => Ok(Self::Canary),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

// ============================================================================
// Installation Snapshot
// ============================================================================

/// Point-in-time view of a platform's installation.
///
/// Never cached: every query re-reads the filesystem. `installed == false`
/// always comes with `path == None` and `plugged == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub platform: Platform,
    /// Path to the active bundle, if the installation was found.
    pub path: Option<PathBuf>,
    pub installed: bool,
    /// True when the loader stub is active and the original is preserved.
    pub plugged: bool,
}

impl Installation {
    /// Snapshot for a platform that could not be found.
    pub fn not_installed(platform: Platform) -> Self {
        Self {
            platform,
            path: None,
            installed: false,
            plugged: false,
        }
    }

    /// Snapshot for an installation found at `path`.
    pub(crate) fn found(platform: Platform, path: PathBuf, plugged: bool) -> Self {
        Self {
            platform,
            path: Some(path),
            installed: true,
            plugged,
        }
    }
}
