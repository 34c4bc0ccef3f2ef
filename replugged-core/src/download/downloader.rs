//! Async payload downloader with progress reporting and source checks.
//!
//! The payload is small, so the body is buffered in memory and written to a
//! staging file only once the transfer completed. The staging file is then
//! moved over the final payload path, elevated where the OS requires it.

use futures::{Stream, StreamExt};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::events::{
    download_channel, DownloadEvent, DownloadProgress, DownloadReceiver, DownloadSender,
};
use crate::config::{ensure_config_dir, InstallerConfig, STAGING_PREFIX};
use crate::elevation::{default_policy, ElevationPolicy, FsOp, MutationError};

/// Hosts a GitHub release asset is served from. `releases/latest/download`
/// answers with a redirect onto the asset CDN.
const RELEASE_ASSET_HOSTS: &[&str] = &[
    "github.com",
    "objects.githubusercontent.com",
    "release-assets.githubusercontent.com",
];

const MAX_REDIRECTS: usize = 10;

/// Upper bound for preallocating the body buffer from Content-Length.
const MAX_PREALLOC_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    ConfigDir(#[from] anyhow::Error),
    #[error("Failed to move payload into place: {0}")]
    Relocate(#[from] MutationError),
}

// ============================================================================
// Download Sources
// ============================================================================

/// Where the payload may come from.
///
/// Applied to the configured URL before any request and again to every
/// redirect hop, so a redirect cannot leave the release asset hosts.
#[derive(Debug, Clone)]
pub(crate) struct SourcePolicy {
    hosts: Vec<String>,
    https_only: bool,
    system_proxy: bool,
}

impl SourcePolicy {
    pub(crate) fn release_assets() -> Self {
        Self {
            hosts: RELEASE_ASSET_HOSTS.iter().map(|h| h.to_string()).collect(),
            https_only: true,
            system_proxy: true,
        }
    }

    /// Plain HTTP from a local test server.
    #[cfg(test)]
    pub(crate) fn loopback() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            https_only: false,
            system_proxy: false,
        }
    }

    fn check(&self, url: &Url) -> Result<(), String> {
        match url.scheme() {
            "https" => {}
            "http" if !self.https_only => {}
            scheme => return Err(format!("payload must be fetched over HTTPS, not {}", scheme)),
        }

        let host = url
            .host_str()
            .ok_or_else(|| format!("{} has no host", url))?;

        // Exact match: the asset hosts are fixed, subdomains are not trusted.
        if !self.hosts.iter().any(|allowed| allowed == host) {
            return Err(format!(
                "{} is not a release asset host (expected one of {:?})",
                host, self.hosts
            ));
        }

        Ok(())
    }

    fn parse(&self, url_str: &str) -> Result<Url, DownloadError> {
        let url = Url::parse(url_str)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url_str, e)))?;
        self.check(&url).map_err(DownloadError::InvalidUrl)?;
        Ok(url)
    }

    fn client(&self) -> Result<reqwest::Client, DownloadError> {
        let sources = self.clone();
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match sources.check(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(reason) => attempt.error(reason),
            }
        });

        let mut builder = reqwest::Client::builder().redirect(redirect);
        if !self.system_proxy {
            builder = builder.no_proxy();
        }
        builder
            .build()
            .map_err(|e| DownloadError::Network(format!("Failed to build HTTP client: {}", e)))
    }
}

// ============================================================================
// Payload Downloader
// ============================================================================

/// Downloads the payload bundle into the configuration directory.
pub struct PayloadDownloader {
    config: InstallerConfig,
    policy: Arc<dyn ElevationPolicy>,
    sources: SourcePolicy,
}

impl PayloadDownloader {
    pub fn new(config: InstallerConfig, policy: Arc<dyn ElevationPolicy>) -> Self {
        Self {
            config,
            policy,
            sources: SourcePolicy::release_assets(),
        }
    }

    /// Downloader using the current OS's elevation policy.
    pub fn with_defaults(config: InstallerConfig) -> Self {
        Self::new(config, default_policy())
    }

    #[cfg(test)]
    pub(crate) fn with_sources(mut self, sources: SourcePolicy) -> Self {
        self.sources = sources;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Runs the download on a background task, streaming events back.
    ///
    /// Dropping the receiver does not stop the transfer.
    pub fn spawn(self: Arc<Self>) -> (DownloadReceiver, JoinHandle<Result<(), DownloadError>>) {
        let (sender, receiver) = download_channel();
        let handle = tokio::spawn(async move { self.download(&sender).await });
        (receiver, handle)
    }

    /// Downloads and installs the payload.
    ///
    /// Always finishes with exactly one terminal event: `Done` on success,
    /// `Error` otherwise. The error is also returned.
    pub async fn download(&self, events: &DownloadSender) -> Result<(), DownloadError> {
        let result = self.fetch_and_install(events).await;

        match &result {
            Ok(()) => emit(events, DownloadEvent::Done),
            Err(e) => {
                warn!("Payload download failed: {}", e);
                emit(events, DownloadEvent::Error(e.to_string()));
            }
        }

        result
    }

    async fn fetch_and_install(&self, events: &DownloadSender) -> Result<(), DownloadError> {
        let url = self.sources.parse(&self.config.download_url)?;
        info!("Downloading payload from {}", url);

        let response = self
            .sources
            .client()?
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Network(format!("Failed to start download: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Network(format!(
                "Download failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        let total_bytes = response.content_length();
        debug!("Content-Length: {:?}", total_bytes);

        let body = collect_body(response.bytes_stream(), total_bytes, events).await?;
        self.install(&body).await
    }

    /// Writes the payload to a fresh staging file and moves it into place.
    async fn install(&self, body: &[u8]) -> Result<(), DownloadError> {
        ensure_config_dir(&self.config.config_dir)?;

        let payload = self.config.payload_path();
        let staging = stage(&self.config.staging_dir(), body)?;

        // On failure `staging` is dropped here, which removes the file.
        self.policy
            .mutate(&staging, FsOp::Rename { to: &payload })
            .await?;

        info!(
            "Payload installed: {} bytes written to {}",
            body.len(),
            payload.display()
        );
        Ok(())
    }
}

/// Writes `body` to a new randomly named file in `dir`.
///
/// The file is created exclusively, so nothing planted in `dir` beforehand
/// can redirect the write. It is deleted when the returned path is dropped.
fn stage(dir: &Path, body: &[u8]) -> Result<TempPath, DownloadError> {
    let write_error = |source| DownloadError::Write {
        path: dir.to_path_buf(),
        source,
    };

    let mut file = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(write_error)?;
    file.write_all(body)
        .and_then(|()| file.as_file().sync_all())
        .map_err(write_error)?;

    debug!("Staged payload at {}", file.path().display());
    Ok(file.into_temp_path())
}

/// Buffers a response body, emitting a progress event per chunk.
async fn collect_body<S, B, E>(
    stream: S,
    total_bytes: Option<u64>,
    events: &DownloadSender,
) -> Result<Vec<u8>, DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let capacity = total_bytes.unwrap_or(0).min(MAX_PREALLOC_BYTES) as usize;
    let mut body = Vec::with_capacity(capacity);

    emit(events, DownloadEvent::Progress(DownloadProgress::started(total_bytes)));

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            DownloadError::Network(format!("Failed to read chunk from response stream: {}", e))
        })?;
        body.extend_from_slice(chunk.as_ref());

        let progress = DownloadProgress::new(body.len() as u64, total_bytes);
        emit(events, DownloadEvent::Progress(progress));
    }

    Ok(body)
}

fn emit(events: &DownloadSender, event: DownloadEvent) {
    if events.send(event).is_err() {
        trace!("Download listener dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_FOLDER_NAMES, DEFAULT_DOWNLOAD_URL, PAYLOAD_FILE_NAME};
    use crate::download::events::PROGRESS_INDETERMINATE;
    use crate::elevation::mocks::ScriptedExecutor;
    use crate::elevation::{DirectPolicy, ElevatedPolicy};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn drain(receiver: &mut DownloadReceiver) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn fractions(events: &[DownloadEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress(p) => Some(p.fraction),
                _ => None,
            })
            .collect()
    }

    fn config_in(temp_dir: &TempDir) -> InstallerConfig {
        let staging = temp_dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        InstallerConfig::from_env()
            .with_config_dir(temp_dir.path().join("replugged"))
            .with_staging_dir(staging)
    }

    /// Regular staging files left behind in the staging directory.
    fn staged_files(config: &InstallerConfig) -> Vec<PathBuf> {
        std::fs::read_dir(config.staging_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect()
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        let items: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(items)
    }

    /// Answers a single HTTP request on a loopback port with `head`, then
    /// writes `parts` with a pause between them. Returns the payload URL.
    async fn serve_once(head: &'static str, parts: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            socket.write_all(head.as_bytes()).await.unwrap();
            for part in parts {
                socket.write_all(part.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = socket.shutdown().await;
        });

        format!("http://{}/{}", addr, PAYLOAD_FILE_NAME)
    }

    fn loopback_downloader(config: &InstallerConfig) -> PayloadDownloader {
        PayloadDownloader::new(config.clone(), Arc::new(DirectPolicy))
            .with_sources(SourcePolicy::loopback())
    }

    fn release_check(url: &str) -> Result<Url, DownloadError> {
        SourcePolicy::release_assets().parse(url)
    }

    #[test]
    fn test_release_asset_urls_accepted() {
        assert!(release_check(DEFAULT_DOWNLOAD_URL).is_ok());
        assert!(release_check(
            "https://objects.githubusercontent.com/github-production-release-asset/1/replugged.asar"
        )
        .is_ok());
        assert!(release_check("https://release-assets.githubusercontent.com/1/replugged.asar").is_ok());
    }

    #[test]
    fn test_payload_over_plain_http_rejected() {
        let err = release_check("http://github.com/replugged-org/replugged/releases/latest/download/replugged.asar")
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }

    #[test]
    fn test_hosts_outside_release_assets_rejected() {
        assert!(release_check("https://github.com.evil.org/replugged.asar").is_err());
        assert!(release_check("https://gist.github.com/replugged.asar").is_err());
        assert!(release_check("https://raw.githubusercontent.com/replugged-org/replugged/main/replugged.asar").is_err());
        assert!(release_check("https://evil.com/replugged.asar").is_err());
    }

    #[test]
    fn test_unparseable_or_local_urls_rejected() {
        assert!(release_check("not-a-url").is_err());
        assert!(release_check("").is_err());
        assert!(release_check("file:///etc/passwd").is_err());
        assert!(release_check("ftp://github.com/replugged.asar").is_err());
    }

    #[test]
    fn test_redirect_hops_use_same_check() {
        let sources = SourcePolicy::release_assets();
        let cdn = Url::parse("https://objects.githubusercontent.com/asset").unwrap();
        let elsewhere = Url::parse("https://example.org/asset").unwrap();
        assert!(sources.check(&cdn).is_ok());
        assert!(sources.check(&elsewhere).is_err());
    }

    #[tokio::test]
    async fn test_collect_body_reports_fractions() {
        let (sender, mut receiver) = download_channel();
        let body = collect_body(chunks(&["abcd", "efgh"]), Some(8), &sender)
            .await
            .unwrap();

        assert_eq!(body, b"abcdefgh");
        assert_eq!(fractions(&drain(&mut receiver)), vec![0.0, 0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_collect_body_without_content_length() {
        let (sender, mut receiver) = download_channel();
        let body = collect_body(chunks(&["ab", "cd"]), None, &sender)
            .await
            .unwrap();

        assert_eq!(body.len(), 4);
        assert_eq!(
            fractions(&drain(&mut receiver)),
            vec![0.0, PROGRESS_INDETERMINATE, PROGRESS_INDETERMINATE]
        );
    }

    #[tokio::test]
    async fn test_collect_body_stream_error() {
        let (sender, _receiver) = download_channel();
        let stream = futures::stream::iter(vec![
            Ok(b"ab".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);

        let err = collect_body(stream, Some(10), &sender).await.unwrap_err();
        assert!(matches!(err, DownloadError::Network(_)));
    }

    #[tokio::test]
    async fn test_collect_body_survives_dropped_listener() {
        let (sender, receiver) = download_channel();
        drop(receiver);

        let body = collect_body(chunks(&["payload"]), Some(7), &sender)
            .await
            .unwrap();
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn test_install_direct() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let downloader = PayloadDownloader::new(config.clone(), Arc::new(DirectPolicy));

        downloader.install(b"asar bytes").await.unwrap();

        assert_eq!(std::fs::read(config.payload_path()).unwrap(), b"asar bytes");
        assert!(staged_files(&config).is_empty());
        for folder in CONFIG_FOLDER_NAMES {
            assert!(config.config_dir.join(folder).is_dir());
        }
    }

    #[tokio::test]
    async fn test_install_replaces_existing_payload() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        std::fs::create_dir_all(&config.config_dir).unwrap();
        std::fs::write(config.payload_path(), b"old").unwrap();

        let downloader = PayloadDownloader::new(config.clone(), Arc::new(DirectPolicy));
        downloader.install(b"new").await.unwrap();

        assert_eq!(std::fs::read(config.payload_path()).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_ignores_links_planted_in_staging_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let victim = temp_dir.path().join("victim.txt");
        std::fs::write(&victim, b"untouched").unwrap();

        let guessable = [
            format!("{}{}", STAGING_PREFIX, std::process::id()),
            format!("{}download", STAGING_PREFIX),
            PAYLOAD_FILE_NAME.to_string(),
        ];
        for name in &guessable {
            std::os::unix::fs::symlink(&victim, config.staging_dir().join(name)).unwrap();
        }

        let downloader = PayloadDownloader::new(config.clone(), Arc::new(DirectPolicy));
        downloader.install(b"PAYLOAD").await.unwrap();

        assert_eq!(std::fs::read(&victim).unwrap(), b"untouched");
        let payload = config.payload_path();
        assert!(std::fs::symlink_metadata(&payload).unwrap().file_type().is_file());
        assert_eq!(std::fs::read(&payload).unwrap(), b"PAYLOAD");
        for name in &guessable {
            let link = config.staging_dir().join(name);
            assert!(std::fs::symlink_metadata(link).unwrap().file_type().is_symlink());
        }
    }

    #[tokio::test]
    async fn test_install_relocates_with_elevation() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let executor = Arc::new(ScriptedExecutor::new());
        let downloader =
            PayloadDownloader::new(config.clone(), Arc::new(ElevatedPolicy::new(executor.clone())));

        downloader.install(b"asar bytes").await.unwrap();

        assert_eq!(executor.programs(), vec!["mv"]);
        assert_eq!(std::fs::read(config.payload_path()).unwrap(), b"asar bytes");
        assert!(staged_files(&config).is_empty());
    }

    #[tokio::test]
    async fn test_install_denied_relocation() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let executor = Arc::new(ScriptedExecutor::new().deny_from(0));
        let downloader =
            PayloadDownloader::new(config.clone(), Arc::new(ElevatedPolicy::new(executor)));

        let err = downloader.install(b"asar bytes").await.unwrap_err();

        assert!(matches!(err, DownloadError::Relocate(_)));
        assert!(!config.payload_path().exists());
        assert!(staged_files(&config).is_empty());
    }

    #[tokio::test]
    async fn test_download_rejected_url_emits_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir).with_download_url("http://example.com/replugged.asar");
        let downloader = PayloadDownloader::new(config.clone(), Arc::new(DirectPolicy));
        let (sender, mut receiver) = download_channel();

        let err = downloader.download(&sender).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));

        let events = drain(&mut receiver);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DownloadEvent::Error(_)));
        assert!(!config.payload_path().exists());
        assert!(!config.config_dir.exists());
    }

    #[tokio::test]
    async fn test_download_http_error_status() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            vec![],
        )
        .await;
        let config = config_in(&temp_dir).with_download_url(url);
        let (sender, mut receiver) = download_channel();

        let err = loopback_downloader(&config)
            .download(&sender)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network(ref msg) if msg.contains("404")));

        let events = drain(&mut receiver);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DownloadEvent::Error(_)));
        assert!(!config.config_dir.exists());
        assert!(!config.payload_path().exists());
    }

    #[tokio::test]
    async fn test_download_success_streams_progress_then_done() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n",
            vec!["abcd", "efgh"],
        )
        .await;
        let config = config_in(&temp_dir).with_download_url(url);
        let downloader = Arc::new(loopback_downloader(&config));

        let (mut receiver, handle) = downloader.spawn();
        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            if matches!(event, DownloadEvent::Done) {
                // Installed before the listener hears about it.
                assert_eq!(std::fs::read(config.payload_path()).unwrap(), b"abcdefgh");
            }
            events.push(event);
        }
        handle.await.unwrap().unwrap();

        assert!(matches!(events.last(), Some(DownloadEvent::Done)));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

        let fractions = fractions(&events);
        assert!(fractions.len() >= 2);
        assert_eq!(fractions[0], 0.0);
        assert_eq!(*fractions.last().unwrap(), 1.0);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert!(staged_files(&config).is_empty());
    }

    #[tokio::test]
    async fn test_spawn_ends_with_single_terminal_event() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir).with_download_url("ftp://github.com/replugged.asar");
        let downloader = Arc::new(PayloadDownloader::new(config, Arc::new(DirectPolicy)));

        let (mut receiver, handle) = downloader.spawn();
        assert!(handle.await.unwrap().is_err());

        let events = drain(&mut receiver);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }
}
