//! Fetching the Replugged payload bundle.
//!
//! - `events`: Progress events streamed to the front end
//! - `downloader`: Streaming fetch, validation and relocation into the config directory
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use replugged_core::download::{DownloadEvent, PayloadDownloader};
//!
//! let downloader = Arc::new(PayloadDownloader::with_defaults(InstallerConfig::from_env()));
//! let (mut events, _handle) = downloader.spawn();
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DownloadEvent::Progress(p) => println!("{:.0}%", p.fraction * 100.0),
//!         DownloadEvent::Error(e) => eprintln!("{e}"),
//!         DownloadEvent::Done => break,
//!     }
//! }
//! ```

pub mod downloader;
pub mod events;

pub use downloader::{DownloadError, PayloadDownloader};
pub use events::{
    download_channel, DownloadEvent, DownloadProgress, DownloadReceiver, DownloadSender,
    PROGRESS_INDETERMINATE,
};
