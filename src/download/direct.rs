//! Progressive (single-file) downloads streamed straight to disk.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::constants::{DIRECT_CHUNK_SIZE, PARTIAL_SUFFIX};
use super::error::{DownloadError, FetchFailure};
use super::{ConcurrencyLimiter, HttpClient};

/// Streams one URL to one destination file under a single limiter permit.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: HttpClient,
    limiter: ConcurrencyLimiter,
}

impl DirectFetcher {
    /// Creates a fetcher sharing the run's client and limiter.
    #[must_use]
    pub fn new(client: HttpClient, limiter: ConcurrencyLimiter) -> Self {
        Self { client, limiter }
    }

    /// Downloads `url` to `destination`, returning the number of bytes written.
    ///
    /// The body is written to `<destination>.part` in bounded chunks and renamed
    /// into place only after the last byte is flushed. On any error the partial
    /// file is removed, so `destination` exists only for a complete download.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::DirectFetch`] for request, status, body or
    /// cancellation failures and [`DownloadError::Write`] for disk errors.
    #[instrument(skip(self, token), fields(destination = %destination.display()))]
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        token: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        // Held for the whole transfer, released on every return path.
        let _permit = self
            .limiter
            .acquire_or_cancel(token)
            .await
            .map_err(|e| DownloadError::direct_fetch(url, e))?;

        let response = self
            .client
            .get(url, token)
            .await
            .map_err(|e| DownloadError::direct_fetch(url, e))?;

        let mut partial = PartialFile::new(destination);
        let bytes_written = stream_to_file(response, url, &partial.path, token).await?;

        tokio::fs::rename(&partial.path, destination)
            .await
            .map_err(|e| DownloadError::write(destination, e))?;
        partial.settled = true;

        info!(bytes = bytes_written, "direct download complete");
        Ok(bytes_written)
    }
}

/// `<destination>.part`, removed on drop unless the download was renamed
/// into place. Covers error returns and aborted tasks alike.
#[derive(Debug)]
struct PartialFile {
    path: PathBuf,
    settled: bool,
}

impl PartialFile {
    fn new(destination: &Path) -> Self {
        Self {
            path: partial_path(destination),
            settled: false,
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.settled && std::fs::remove_file(&self.path).is_ok() {
            debug!(path = %self.path.display(), "removed partial file");
        }
    }
}

/// Sibling path a destination is written to before it is complete.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    token: &CancellationToken,
) -> Result<u64, DownloadError> {
    let file = File::create(file_path)
        .await
        .map_err(|e| DownloadError::write(file_path, e))?;
    let mut writer = BufWriter::with_capacity(DIRECT_CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => {
                return Err(DownloadError::direct_fetch(url, FetchFailure::Cancelled));
            }
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else {
            break;
        };
        let chunk =
            chunk_result.map_err(|e| DownloadError::direct_fetch(url, FetchFailure::from_reqwest(e)))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::write(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::write(file_path, e))?;

    Ok(bytes_written)
}
