//! Artifact download with progress tracking

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::progress::DownloadProgress;
use crate::error::{LauncherError, Result};
use crate::fsutil;

/// Write buffer between the network stream and the temp file.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

const USER_AGENT: &str = concat!("aurora-launcher/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the version check and the downloader.
pub fn http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LauncherError::network("<client>", e))
}

/// Progress sender: per-chunk updates are best-effort, boundaries are reliable.
struct ProgressReporter<'a> {
    tx: &'a mpsc::Sender<DownloadProgress>,
    disabled: bool,
}

impl<'a> ProgressReporter<'a> {
    fn new(tx: &'a mpsc::Sender<DownloadProgress>) -> Self {
        Self {
            tx,
            disabled: false,
        }
    }

    fn best_effort(&mut self, progress: DownloadProgress) {
        if self.disabled {
            return;
        }
        match self.tx.try_send(progress) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => self.disable(),
        }
    }

    async fn reliable(&mut self, progress: DownloadProgress) {
        if self.disabled {
            return;
        }
        if self.tx.send(progress).await.is_err() {
            self.disable();
        }
    }

    fn disable(&mut self) {
        warn!("Progress receiver dropped, continuing download without updates");
        self.disabled = true;
    }
}

/// Streams a remote artifact to disk.
#[derive(Debug, Clone)]
pub struct ArtifactDownloader {
    client: reqwest::Client,
    inactivity_timeout: Duration,
}

impl ArtifactDownloader {
    pub fn new(client: reqwest::Client, inactivity_timeout: Duration) -> Self {
        Self {
            client,
            inactivity_timeout,
        }
    }

    /// Download `url` to `destination`, returning the number of bytes written.
    ///
    /// Bytes land in a temp file next to `destination` that is renamed into
    /// place only after the body is complete. On error or cancellation the temp
    /// file is removed and `destination` is left untouched. Every call starts
    /// from byte zero.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: &mpsc::Sender<DownloadProgress>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let parent = fsutil::parent_dir(destination);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io("create_download_dir", parent, e))?;

        info!("Downloading {url}");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled { operation: "download" }),
            sent = timeout(self.inactivity_timeout, self.client.get(url).send()) => match sent {
                Ok(result) => result
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| LauncherError::network(url, e))?,
                Err(_) => return Err(self.stalled(url, 0)),
            },
        };

        let total_bytes = response.content_length();
        match total_bytes {
            Some(total) => debug!("{url}: declared length {total} bytes"),
            None => debug!("{url}: no declared length, progress is indeterminate"),
        }

        // TempPath removes the partial file when dropped on any early return.
        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| LauncherError::io("create_temp_download", parent, e))?
            .into_parts();
        let mut writer =
            BufWriter::with_capacity(WRITE_BUFFER_BYTES, tokio::fs::File::from_std(std_file));

        let mut reporter = ProgressReporter::new(progress_tx);
        reporter.reliable(DownloadProgress::start(total_bytes)).await;

        let mut stream = response.bytes_stream();
        let mut bytes_read: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Download of {url} cancelled after {bytes_read} bytes");
                    return Err(LauncherError::Cancelled { operation: "download" });
                }
                next = timeout(self.inactivity_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    return Err(match total_bytes {
                        Some(expected) if (e.is_body() || e.is_decode()) && bytes_read < expected => {
                            debug!("{url}: body ended early: {e}");
                            LauncherError::Truncated {
                                url: url.to_string(),
                                bytes_read,
                                expected,
                            }
                        }
                        _ => LauncherError::network(url, e),
                    });
                }
                Ok(None) => break,
                Err(_) => return Err(self.stalled(url, bytes_read)),
            };

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io("write_download", &temp_path, e))?;
            bytes_read += chunk.len() as u64;
            reporter.best_effort(DownloadProgress::new(bytes_read, total_bytes));
        }

        if let Some(expected) = total_bytes
            && bytes_read < expected
        {
            return Err(LauncherError::Truncated {
                url: url.to_string(),
                bytes_read,
                expected,
            });
        }

        writer
            .flush()
            .await
            .map_err(|e| LauncherError::io("flush_download", &temp_path, e))?;
        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| LauncherError::io("sync_download", &temp_path, e))?;
        drop(file);

        temp_path
            .persist(destination)
            .map_err(|e| LauncherError::io("persist_download", destination, e.error))?;

        reporter
            .reliable(DownloadProgress::new(bytes_read, total_bytes))
            .await;
        info!("Downloaded {bytes_read} bytes to {}", destination.display());
        Ok(bytes_read)
    }

    fn stalled(&self, url: &str, bytes_read: u64) -> LauncherError {
        LauncherError::Stalled {
            url: url.to_string(),
            secs: self.inactivity_timeout.as_secs(),
            bytes_read,
        }
    }
}
