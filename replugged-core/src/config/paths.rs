//! Replugged configuration directory.
//!
//! The directory holds the downloaded payload and the user's add-ons:
//!
//! - Windows: `%APPDATA%\replugged\`
//! - macOS: `~/Library/Application Support/replugged/`
//! - Linux: `$XDG_CONFIG_HOME/replugged/` or `~/.config/replugged/`
//!
//! `REPLUGGED_CONFIG_DIR` overrides the location.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "REPLUGGED_CONFIG_DIR";

/// Subdirectory name under the OS config folder.
const REPLUGGED_DIR: &str = "replugged";

/// File name of the downloaded payload bundle.
pub const PAYLOAD_FILE_NAME: &str = "replugged.asar";

/// Subfolders created alongside the payload.
pub const CONFIG_FOLDER_NAMES: [&str; 4] = ["plugins", "themes", "settings", "quickcss"];

// ============================================================================
// Path Resolution
// ============================================================================

/// Returns the configuration directory, computed once per process.
pub fn default_config_dir() -> &'static Path {
    static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();
    CONFIG_DIR.get_or_init(|| {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(REPLUGGED_DIR)
    })
}

/// Returns the payload path inside a configuration directory.
pub fn payload_path(config_dir: &Path) -> PathBuf {
    config_dir.join(PAYLOAD_FILE_NAME)
}

/// Ensures the configuration directory and its subfolders exist.
///
/// On Linux every directory this call creates, including missing ancestors,
/// is handed to the owner of the nearest ancestor that already existed, so a
/// privileged process does not leave root-owned folders in the user's home.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or chowned.
pub fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    let anchor = nearest_existing_ancestor(config_dir);
    let created = create_config_tree(config_dir)?;

    if created.is_empty() {
        debug!("Config directory {} already exists", config_dir.display());
        return Ok(());
    }

    info!(
        "Created {} directories for {}",
        created.len(),
        config_dir.display()
    );
    match anchor {
        Some(anchor) => fix_ownership(&anchor, &created),
        None => Ok(()),
    }
}

/// Closest ancestor of `path`, or `path` itself, that exists on disk.
fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .filter(|dir| !dir.as_os_str().is_empty())
        .find(|dir| dir.exists())
        .map(Path::to_path_buf)
}

/// Creates the root and its subfolders. Returns the directories that did not
/// exist before, parents first.
fn create_config_tree(config_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut created: Vec<PathBuf> = config_dir
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect();
    created.reverse();

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create directory: {}", config_dir.display()))?;

    for folder in CONFIG_FOLDER_NAMES {
        let dir = config_dir.join(folder);
        let existed = dir.exists();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        if !existed {
            created.push(dir);
        }
    }

    Ok(created)
}

#[cfg(target_os = "linux")]
fn fix_ownership(anchor: &Path, created: &[PathBuf]) -> Result<()> {
    use std::os::unix::fs::{chown, MetadataExt};

    let anchor_meta = std::fs::metadata(anchor)
        .with_context(|| format!("Failed to stat {}", anchor.display()))?;
    let (uid, gid) = (anchor_meta.uid(), anchor_meta.gid());

    for dir in created {
        let meta = std::fs::metadata(dir)
            .with_context(|| format!("Failed to stat {}", dir.display()))?;
        if meta.uid() == uid && meta.gid() == gid {
            continue;
        }

        info!(uid, gid, "Restoring ownership of {}", dir.display());
        chown(dir, Some(uid), Some(gid))
            .with_context(|| format!("Failed to chown {}", dir.display()))?;
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn fix_ownership(_anchor: &Path, _created: &[PathBuf]) -> Result<()> {
    Ok(())
}
