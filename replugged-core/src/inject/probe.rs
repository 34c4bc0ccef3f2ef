//! Read-only detection of installed/plugged state.

use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::resolver::PathResolver;
use super::types::{installation_root, original_bundle_path, Installation, Platform};

/// Determines whether a platform is installed and whether it is plugged.
///
/// Probing never fails: resolver errors and missing directories all collapse
/// into [`Installation::not_installed`].
#[derive(Clone)]
pub struct InstallationProbe {
    resolver: Arc<dyn PathResolver>,
}

impl InstallationProbe {
    pub fn new(resolver: Arc<dyn PathResolver>) -> Self {
        Self { resolver }
    }

    /// Takes a fresh snapshot of a platform's installation.
    pub async fn probe(&self, platform: Platform) -> Installation {
        let app_dir = match self.resolver.resolve(platform).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!(%platform, "No installation found");
                return Installation::not_installed(platform);
            }
            Err(e) => {
                warn!(%platform, "Failed to resolve installation: {e:#}");
                return Installation::not_installed(platform);
            }
        };

        if !is_installed(&app_dir).await {
            debug!(%platform, path = %app_dir.display(), "Installation directory missing");
            return Installation::not_installed(platform);
        }

        let plugged = is_plugged(&app_dir).await;
        debug!(%platform, path = %app_dir.display(), plugged, "Probed installation");
        Installation::found(platform, app_dir, plugged)
    }

    /// Probes every known platform concurrently, in [`Platform::all`] order.
    pub async fn list_installations(&self) -> Vec<Installation> {
        join_all(Platform::all().iter().map(|p| self.probe(*p))).await
    }
}

async fn is_installed(app_dir: &Path) -> bool {
    match installation_root(app_dir) {
        Some(root) => tokio::fs::try_exists(root).await.unwrap_or(false),
        None => false,
    }
}

async fn is_plugged(app_dir: &Path) -> bool {
    tokio::fs::try_exists(original_bundle_path(app_dir))
        .await
        .unwrap_or(false)
}
