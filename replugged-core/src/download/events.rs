//! Download progress events.

use tokio::sync::mpsc;

/// Fraction reported when the server did not declare a usable content length.
pub const PROGRESS_INDETERMINATE: f64 = -1.0;

/// Progress information during a download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Bytes received so far.
    pub bytes_received: u64,
    /// Total bytes expected (if known from Content-Length header).
    pub total_bytes: Option<u64>,
    /// Progress in `0.0..=1.0`, or [`PROGRESS_INDETERMINATE`].
    pub fraction: f64,
}

impl DownloadProgress {
    /// The event sent before the first chunk arrives.
    pub(crate) fn started(total_bytes: Option<u64>) -> Self {
        Self {
            bytes_received: 0,
            total_bytes,
            fraction: 0.0,
        }
    }

    pub(crate) fn new(bytes_received: u64, total_bytes: Option<u64>) -> Self {
        let fraction = match total_bytes {
            Some(total) if total > 0 => bytes_received as f64 / total as f64,
            _ => PROGRESS_INDETERMINATE,
        };

        Self {
            bytes_received,
            total_bytes,
            fraction,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.fraction < 0.0
    }
}

/// Events sent from the downloader to the front end.
///
/// Zero or more `Progress` events are followed by exactly one of `Error` or
/// `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Error(String),
    Done,
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done)
    }
}

/// Sender for download events.
pub type DownloadSender = mpsc::UnboundedSender<DownloadEvent>;

/// Receiver for download events.
pub type DownloadReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

/// Create an event channel for streaming download events.
pub fn download_channel() -> (DownloadSender, DownloadReceiver) {
    mpsc::unbounded_channel()
}
