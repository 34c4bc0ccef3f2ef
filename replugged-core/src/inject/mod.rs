//! Plugging Replugged into a Discord installation.
//!
//! # Architecture
//!
//! - `types`: Platform identifiers, installation snapshots, bundle layout
//! - `resolver`: Locating `app.asar` for a platform
//! - `probe`: Read-only installed/plugged detection
//! - `injector`: The plug/unplug state machine
//!
//! # Example
//!
//! ```ignore
//! use replugged_core::{InstallerConfig, PatchEngine, Platform};
//!
//! let engine = PatchEngine::with_defaults(&InstallerConfig::from_env());
//!
//! if engine.probe().probe(Platform::Stable).await.installed {
//!     engine.plug(Platform::Stable).await?;
//! }
//! ```

pub mod injector;
pub mod probe;
pub mod resolver;
pub mod types;

pub use injector::{entry_script, package_manifest, PatchEngine, PatchError};
pub use probe::InstallationProbe;
pub use resolver::{PathResolver, StaticPathResolver, SystemPathResolver};
pub use types::{
    installation_root, is_sandboxed, original_bundle_path, Installation, Platform,
    ACTIVE_BUNDLE_NAME, ORIGINAL_BUNDLE_NAME,
};
