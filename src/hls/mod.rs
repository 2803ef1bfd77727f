//! HLS download pipeline.
//!
//! A task runs: manifest -> key (at most once) -> segment fan-out under the
//! shared limiter -> ordered assembly into one file.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use stream_downloader::download::{ConcurrencyLimiter, HttpClient};
//! use stream_downloader::hls::HlsPipeline;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = HlsPipeline::new(HttpClient::new(), ConcurrencyLimiter::new(6));
//! let bytes = pipeline
//!     .download(
//!         "https://cdn.example/ep1/index.m3u8",
//!         Path::new("./ep1.ts"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("wrote {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod assembler;
mod key;
mod playlist;
mod segment;

use std::path::Path;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub use assembler::Assembler;
pub use key::{KEY_LEN, KeyMaterial, KeyResolver, parse_iv};
pub use playlist::{KeyRef, ParsedManifest, Playlist, PlaylistResolver, SegmentRef, parse_manifest};
pub use segment::{SegmentFetcher, SegmentResult, decrypt_segment};

use crate::download::constants::SEGMENT_WINDOW;
use crate::download::{ConcurrencyLimiter, DownloadError, HttpClient};

/// Drives one HLS task from manifest URL to finished file.
#[derive(Debug, Clone)]
pub struct HlsPipeline {
    client: HttpClient,
    limiter: ConcurrencyLimiter,
    window: usize,
}

impl HlsPipeline {
    /// Creates a pipeline sharing the run's client and limiter.
    #[must_use]
    pub fn new(client: HttpClient, limiter: ConcurrencyLimiter) -> Self {
        let window = SEGMENT_WINDOW.max(limiter.capacity());
        Self {
            client,
            limiter,
            window,
        }
    }

    /// Caps how far segment fetches may run ahead of the assembler.
    ///
    /// Segment `i` is only requested once index `i - window` has been
    /// written, so at most `window` payloads are in flight or buffered.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Downloads the playlist at `manifest_url` into `destination`.
    ///
    /// Segment fetches run concurrently, bounded by the shared limiter and by
    /// the run-ahead window.
    /// The first failing segment cancels the rest and the partial output is
    /// removed, so `destination` only ever holds a complete file.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage.
    #[instrument(skip(self, token), fields(destination = %destination.display()))]
    pub async fn download(
        &self,
        manifest_url: &str,
        destination: &Path,
        token: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let playlist = PlaylistResolver::new(self.client.clone(), self.limiter.clone())
            .resolve(manifest_url, token)
            .await?;

        let key = match &playlist.key {
            Some(key_ref) => Some(
                KeyResolver::new(self.client.clone(), self.limiter.clone())
                    .resolve(key_ref, token)
                    .await?,
            ),
            None => None,
        };

        let fetcher = SegmentFetcher::new(self.client.clone(), self.limiter.clone(), key);
        let segment_token = token.child_token();
        let mut assembler = Assembler::create(destination, playlist.segments.len()).await?;

        let mut queued = playlist.segments.into_iter().peekable();
        let mut fetches = JoinSet::new();

        loop {
            let limit = assembler.next_index().saturating_add(self.window);
            while let Some(segment) = queued.next_if(|s| s.sequence_index < limit) {
                let fetcher = fetcher.clone();
                let token = segment_token.clone();
                fetches.spawn(async move { fetcher.fetch(&segment, &token).await });
            }

            let Some(joined) = fetches.join_next().await else {
                break;
            };
            let pushed = match joined {
                Ok(result) => assembler.push(result).await,
                Err(e) => {
                    warn!(error = %e, "segment task panicked");
                    Ok(())
                }
            };
            if let Err(e) = pushed {
                debug!(error = %e, pending = fetches.len(), "cancelling remaining segment fetches");
                segment_token.cancel();
                fetches.shutdown().await;
                assembler.abort().await;
                return Err(e);
            }
        }

        // A panicked segment never reaches the assembler and shows up here as missing.
        assembler.finish().await
    }
}
