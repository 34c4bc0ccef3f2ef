//! Locating the Discord startup bundle on disk.
//!
//! The patch engine only needs "where is `app.asar` for this platform".
//! [`SystemPathResolver`] answers that for the usual install locations of each
//! OS; [`StaticPathResolver`] lets callers (and tests) point at a fixed path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::types::{Platform, ACTIVE_BUNDLE_NAME};

/// Resolves the active bundle path for a platform.
///
/// Implementations may fail for any reason; the probe treats a failure the
/// same as `Ok(None)`.
#[async_trait]
pub trait PathResolver: Send + Sync {
    async fn resolve(&self, platform: Platform) -> Result<Option<PathBuf>>;
}

// ============================================================================
// Static Resolver
// ============================================================================

/// Resolver backed by a fixed platform -> path map.
#[derive(Debug, Clone, Default)]
pub struct StaticPathResolver {
    paths: HashMap<Platform, PathBuf>,
}

impl StaticPathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the bundle path for a platform.
    pub fn with_path(mut self, platform: Platform, app_dir: impl Into<PathBuf>) -> Self {
        self.paths.insert(platform, app_dir.into());
        self
    }
}

#[async_trait]
impl PathResolver for StaticPathResolver {
    async fn resolve(&self, platform: Platform) -> Result<Option<PathBuf>> {
        Ok(self.paths.get(&platform).cloned())
    }
}

// ============================================================================
// System Resolver
// ============================================================================

/// Resolver that searches the standard install locations of the current OS.
#[derive(Debug, Clone, Default)]
pub struct SystemPathResolver;

#[async_trait]
impl PathResolver for SystemPathResolver {
    async fn resolve(&self, platform: Platform) -> Result<Option<PathBuf>> {
        if cfg!(windows) {
            let local = dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine %LOCALAPPDATA%"))?;
            return resolve_windows(&local.join(windows_dir_name(platform))).await;
        }

        let candidates = if cfg!(target_os = "macos") {
            vec![macos_candidate(platform)]
        } else {
            linux_candidates(platform, dirs::home_dir().as_deref())
        };

        first_existing(candidates).await
    }
}

/// Returns the first candidate whose `resources/` directory exists.
async fn first_existing(candidates: Vec<PathBuf>) -> Result<Option<PathBuf>> {
    for candidate in candidates {
        let Some(resources) = candidate.parent() else {
            continue;
        };
        if tokio::fs::try_exists(resources).await.unwrap_or(false) {
            debug!("Found Discord bundle candidate at {}", candidate.display());
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

async fn resolve_windows(install_dir: &Path) -> Result<Option<PathBuf>> {
    if !tokio::fs::try_exists(install_dir).await.unwrap_or(false) {
        return Ok(None);
    }

    let mut entries = tokio::fs::read_dir(install_dir)
        .await
        .with_context(|| format!("Failed to read {}", install_dir.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    Ok(latest_app_dir(&names).map(|dir| {
        install_dir
            .join(dir)
            .join("resources")
            .join(ACTIVE_BUNDLE_NAME)
    }))
}

/// Picks the highest `app-x.y.z` directory name.
fn latest_app_dir(names: &[String]) -> Option<&str> {
    names
        .iter()
        .filter_map(|name| {
            let version = name.strip_prefix("app-")?;
            let parts: Option<Vec<u32>> = version.split('.').map(|p| p.parse().ok()).collect();
            parts.map(|parts| (parts, name.as_str()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, name)| name)
}

fn windows_dir_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Stable => "Discord",
        Platform::Ptb => "DiscordPTB",
        Platform::Canary => "DiscordCanary",
        Platform::Development => "DiscordDevelopment",
    }
}

fn macos_candidate(platform: Platform) -> PathBuf {
    PathBuf::from("/Applications")
        .join(format!("{}.app", platform.display_name()))
        .join("Contents")
        .join("Resources")
        .join(ACTIVE_BUNDLE_NAME)
}

fn linux_package_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Stable => "discord",
        Platform::Ptb => "discord-ptb",
        Platform::Canary => "discord-canary",
        Platform::Development => "discord-development",
    }
}

fn flatpak_app_id(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::Stable => Some("com.discordapp.Discord"),
        Platform::Canary => Some("com.discordapp.DiscordCanary"),
        Platform::Ptb | Platform::Development => None,
    }
}

/// Candidate bundle paths for Linux, in search order.
fn linux_candidates(platform: Platform, home: Option<&Path>) -> Vec<PathBuf> {
    let name = linux_package_name(platform);
    let bundle = |base: PathBuf| base.join("resources").join(ACTIVE_BUNDLE_NAME);

    let mut roots: Vec<PathBuf> = ["/usr/share", "/usr/lib", "/usr/lib64", "/opt"]
        .iter()
        .map(|root| Path::new(root).join(name))
        .collect();

    if let Some(home) = home {
        roots.push(home.join(".local").join("share").join(name));
    }

    if let Some(app_id) = flatpak_app_id(platform) {
        let mut flatpak_roots = vec![PathBuf::from("/var/lib/flatpak")];
        if let Some(home) = home {
            flatpak_roots.push(home.join(".local").join("share").join("flatpak"));
        }
        for root in flatpak_roots {
            roots.push(
                root.join("app")
                    .join(app_id)
                    .join("current")
                    .join("active")
                    .join("files")
                    .join(name),
            );
        }
    }

    roots.into_iter().map(bundle).collect()
}
