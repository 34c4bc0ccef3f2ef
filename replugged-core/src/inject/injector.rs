//! The plug/unplug state machine.
//!
//! `Unplugged`: `app.asar` is Discord's own bundle.
//! `Plugged`: `app.asar` is a loader stub requiring the payload, and the
//! original bundle lives next to it as `app.orig.asar`.
//!
//! Every step is awaited before the next one starts. Callers must serialize
//! calls for the same platform; nothing here locks the bundle path.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::probe::InstallationProbe;
use super::resolver::SystemPathResolver;
use super::types::{
    is_sandboxed, original_bundle_path, Platform, STUB_ENTRY_NAME, STUB_MANIFEST_NAME,
};
use crate::config::InstallerConfig;
use crate::elevation::{default_policy, ElevationPolicy, FsOp, MutationError};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Sandboxed installations are not supported yet: {}", .0.display())]
    UnsupportedEnvironment(PathBuf),
    #[error("Original bundle missing at {}; refusing to remove the active bundle", .0.display())]
    MissingOriginal(PathBuf),
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// Manifest written into the loader stub.
pub fn package_manifest() -> String {
    json!({ "main": STUB_ENTRY_NAME, "name": "discord" }).to_string()
}

/// Entry script that loads the payload from an absolute path.
///
/// Separators are normalized to `/` and the path is emitted as a JSON string
/// literal, which is also a valid JavaScript string literal.
pub fn entry_script(payload_path: &Path) -> String {
    let normalized = payload_path.to_string_lossy().replace('\\', "/");
    format!("require({})", serde_json::Value::String(normalized))
}

/// Swaps Discord's startup bundle for the loader stub and back.
pub struct PatchEngine {
    probe: InstallationProbe,
    policy: Arc<dyn ElevationPolicy>,
    payload_path: PathBuf,
}

impl PatchEngine {
    pub fn new(
        probe: InstallationProbe,
        policy: Arc<dyn ElevationPolicy>,
        config: &InstallerConfig,
    ) -> Self {
        Self {
            probe,
            policy,
            payload_path: config.payload_path(),
        }
    }

    /// Engine wired to the system resolver and the current OS's policy.
    pub fn with_defaults(config: &InstallerConfig) -> Self {
        Self::new(
            InstallationProbe::new(Arc::new(SystemPathResolver)),
            default_policy(),
            config,
        )
    }

    pub fn probe(&self) -> &InstallationProbe {
        &self.probe
    }

    // ========================================================================
    // Platform-level operations
    // ========================================================================

    /// Plugs a platform.
    ///
    /// Returns `Ok(false)` when the platform is not installed or the swap did
    /// not take effect. An already plugged platform is unplugged first so
    /// stubs never stack.
    pub async fn plug(&self, platform: Platform) -> Result<bool, PatchError> {
        let installation = self.probe.probe(platform).await;
        let Some(app_dir) = installation.path else {
            info!(%platform, "Cannot plug: not installed");
            return Ok(false);
        };

        if installation.plugged {
            info!(%platform, "Already plugged, unplugging first");
            self.uninject(&app_dir).await?;
            if self.probe.probe(platform).await.plugged {
                warn!(%platform, "Still plugged after unplugging, aborting");
                return Ok(false);
            }
        }

        self.inject(&app_dir).await?;

        let plugged = self.probe.probe(platform).await.plugged;
        if plugged {
            info!(%platform, "Plugged {}", app_dir.display());
        } else {
            warn!(%platform, "Plug did not take effect at {}", app_dir.display());
        }
        Ok(plugged)
    }

    /// Unplugs a platform.
    ///
    /// Returns `Ok(false)` when the platform is not installed and `Ok(true)`
    /// without touching anything when it is not plugged.
    pub async fn unplug(&self, platform: Platform) -> Result<bool, PatchError> {
        let installation = self.probe.probe(platform).await;
        let Some(app_dir) = installation.path else {
            info!(%platform, "Cannot unplug: not installed");
            return Ok(false);
        };

        if !installation.plugged {
            info!(%platform, "Not plugged, nothing to do");
            return Ok(true);
        }

        self.uninject(&app_dir).await?;

        let unplugged = !self.probe.probe(platform).await.plugged;
        if unplugged {
            info!(%platform, "Unplugged {}", app_dir.display());
        } else {
            warn!(%platform, "Unplug did not take effect at {}", app_dir.display());
        }
        Ok(unplugged)
    }

    // ========================================================================
    // Bundle-level operations
    // ========================================================================

    /// Moves the original bundle aside and writes the loader stub.
    ///
    /// A failure after the original was moved leaves no active bundle; rerunning
    /// `plug` recovers since the preserved original makes the probe report plugged.
    pub async fn inject(&self, app_dir: &Path) -> Result<(), PatchError> {
        if is_sandboxed(app_dir) {
            return Err(PatchError::UnsupportedEnvironment(app_dir.to_path_buf()));
        }

        self.move_to_original(app_dir).await?;
        self.write_stub(app_dir).await
    }

    /// Removes the loader stub and restores the original bundle.
    ///
    /// A failure between the two steps leaves no active bundle; rerunning
    /// `unplug` completes the restore.
    pub async fn uninject(&self, app_dir: &Path) -> Result<(), PatchError> {
        let original = original_bundle_path(app_dir);
        if !exists(&original).await {
            return Err(PatchError::MissingOriginal(original));
        }

        self.policy.mutate(app_dir, FsOp::RemoveAll).await?;
        self.policy
            .mutate(&original, FsOp::Rename { to: app_dir })
            .await?;
        Ok(())
    }

    async fn move_to_original(&self, app_dir: &Path) -> Result<(), PatchError> {
        let original = original_bundle_path(app_dir);

        if !exists(&original).await {
            self.policy
                .mutate(app_dir, FsOp::Rename { to: &original })
                .await?;
        }

        // Left over when the original was already preserved, e.g. after a
        // Discord update rewrote app.asar.
        if exists(app_dir).await {
            self.policy.mutate(app_dir, FsOp::RemoveAll).await?;
        }

        Ok(())
    }

    async fn write_stub(&self, app_dir: &Path) -> Result<(), PatchError> {
        let script = entry_script(&self.payload_path);
        let manifest = package_manifest();

        self.policy.mutate(app_dir, FsOp::CreateDir).await?;
        self.policy
            .mutate(
                &app_dir.join(STUB_ENTRY_NAME),
                FsOp::WriteFile {
                    contents: script.as_bytes(),
                },
            )
            .await?;
        self.policy
            .mutate(
                &app_dir.join(STUB_MANIFEST_NAME),
                FsOp::WriteFile {
                    contents: manifest.as_bytes(),
                },
            )
            .await?;
        Ok(())
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
