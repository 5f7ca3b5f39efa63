//! Streaming download of a single release asset.
//!
//! The body is written in fixed-size chunks. Cancellation is polled before
//! every chunk, so at most one chunk is written after a stop is requested.
//! A [`DownloadSession`] owns the destination file until the download is
//! accepted; any other way out of [`Downloader::download`] deletes it.

use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::InstallerConfig;
use crate::error::{Result, ToolFetchError};
use crate::progress::{download_percent, ProgressReporter};
use crate::release::ReleaseAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { bytes: u64 },
    Cancelled,
}

pub struct Downloader {
    http_client: Client,
    chunk_size: usize,
    progress_every_chunks: u64,
    min_size: u64,
    progress_cap: u8,
}

impl Downloader {
    pub fn new(http_client: Client, config: &InstallerConfig) -> Self {
        Self {
            http_client,
            chunk_size: config.chunk_size.max(1),
            progress_every_chunks: config.progress_every_chunks.max(1),
            min_size: config.min_download_size,
            progress_cap: config.download_progress_cap.min(100),
        }
    }

    /// Stream `asset` into `dest`.
    ///
    /// Returns [`DownloadOutcome::Cancelled`] when `cancel` is observed; in
    /// that case, and on every error, `dest` does not exist afterwards.
    pub async fn download(
        &self,
        asset: &ReleaseAsset,
        dest: &Path,
        cancel: &CancelFlag,
        progress: &ProgressReporter<'_>,
    ) -> Result<DownloadOutcome> {
        info!("Downloading {} to {}", asset.name, dest.display());

        let response = self
            .http_client
            .get(&asset.url)
            .send()
            .await
            .map_err(|e| ToolFetchError::network(format!("downloading {}", asset.name), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolFetchError::HttpStatus {
                url: asset.url.clone(),
                status: status.as_u16(),
            });
        }

        if cancel.checkpoint("after download response") {
            return Ok(DownloadOutcome::Cancelled);
        }

        let total = asset.size.or_else(|| response.content_length());
        debug!("Expected size: {:?}", total);

        let mut session = DownloadSession::create(dest).await?;
        let mut stream = response.bytes_stream();
        progress.report(0);

        while let Some(block) = stream.next().await {
            let block = block
                .map_err(|e| ToolFetchError::network(format!("reading {}", asset.name), e))?;

            for chunk in block.chunks(self.chunk_size) {
                if cancel.checkpoint("during download") {
                    session.discard().await;
                    return Ok(DownloadOutcome::Cancelled);
                }

                session.write_chunk(chunk).await?;

                if session.chunks % self.progress_every_chunks == 0 {
                    progress.report(download_percent(
                        session.bytes_written,
                        total,
                        self.progress_cap,
                    ));
                }
            }
        }

        let bytes = session.finish(self.min_size, &asset.name).await?;
        progress.report(download_percent(bytes, total, self.progress_cap));

        info!("Download complete: {} bytes written to {}", bytes, dest.display());
        Ok(DownloadOutcome::Completed { bytes })
    }
}

/// Destination file of one in-flight download.
///
/// Dropping a session that was not [`finish`](Self::finish)ed removes the
/// file.
pub struct DownloadSession {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
    chunks: u64,
    kept: bool,
}

impl DownloadSession {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .await
            .map_err(|e| ToolFetchError::fs(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            bytes_written: 0,
            chunks: 0,
            kept: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            ToolFetchError::fs(
                &self.path,
                std::io::Error::other("download file already closed"),
            )
        })?;
        file.write_all(chunk)
            .await
            .map_err(|e| ToolFetchError::fs(&self.path, e))?;
        self.bytes_written += chunk.len() as u64;
        self.chunks += 1;
        Ok(())
    }

    /// Close the file and accept it if it is at least `min_size` bytes.
    pub async fn finish(mut self, min_size: u64, name: &str) -> Result<u64> {
        self.close().await?;

        let size = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ToolFetchError::fs(&self.path, e))?
            .len();

        if size < min_size {
            warn!("{} is only {} bytes, discarding", name, size);
            self.remove().await;
            return Err(ToolFetchError::DownloadIntegrity {
                file: name.to_string(),
                size,
                minimum: min_size,
            });
        }

        self.kept = true;
        Ok(size)
    }

    /// Close and delete the partial file.
    pub async fn discard(mut self) {
        if let Err(e) = self.close().await {
            debug!("Ignoring error while closing partial download: {}", e);
        }
        self.remove().await;
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| ToolFetchError::fs(&self.path, e))?;
        }
        Ok(())
    }

    async fn remove(&mut self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
        // Nothing left for Drop to clean up.
        self.kept = true;
    }
}

impl Drop for DownloadSession {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}
