//! In-memory download queue.
//!
//! URLs are classified once, when they are enqueued, by the suffix of their
//! path: `.m3u8` is an HLS manifest, `.mp4` a progressive file. Anything else
//! is logged and dropped; nothing downstream inspects extensions again.
//!
//! # Example
//!
//! ```
//! use stream_downloader::queue::{DownloadQueue, TaskKind};
//!
//! let mut queue = DownloadQueue::new();
//! assert_eq!(queue.enqueue("https://x/a.m3u8", "/tmp/a.mp4"), Some(TaskKind::Hls));
//! assert_eq!(queue.enqueue("https://x/b.mp4", "/tmp/b.mp4"), Some(TaskKind::Direct));
//! assert_eq!(queue.enqueue("https://x/c.txt", "/tmp/c.mp4"), None);
//! assert_eq!(queue.len(), 2);
//! ```

mod item;

pub use item::{DownloadTask, TaskKind};

use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};
use url::Url;

use crate::download::DownloadError;

/// Path suffix identifying an HLS manifest.
pub const HLS_EXTENSION: &str = "m3u8";

/// Path suffix identifying a progressive file.
pub const DIRECT_EXTENSION: &str = "mp4";

/// Classifies a URL by the extension of its path, ignoring query and fragment.
///
/// # Errors
///
/// Returns [`DownloadError::UnsupportedUrl`] when the URL does not parse or
/// its path has neither recognised extension.
pub fn classify_url(url: &str) -> Result<TaskKind, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::unsupported_url(url))?;
    let extension = Path::new(parsed.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some(HLS_EXTENSION) => Ok(TaskKind::Hls),
        Some(DIRECT_EXTENSION) => Ok(TaskKind::Direct),
        _ => Err(DownloadError::unsupported_url(url)),
    }
}

/// Tasks waiting for the next engine run.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    tasks: Vec<DownloadTask>,
}

impl DownloadQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a download request; no network activity happens here.
    ///
    /// Returns the task kind when the request was queued, or `None` when it
    /// was dropped: unsupported URLs and destinations already claimed by a
    /// queued task are logged at `warn` and ignored.
    #[instrument(skip(self, destination), fields(destination = %destination.as_ref().display()))]
    pub fn enqueue(&mut self, url: &str, destination: impl AsRef<Path>) -> Option<TaskKind> {
        let destination = destination.as_ref();
        let kind = match classify_url(url) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "dropping download request");
                return None;
            }
        };

        if self.tasks.iter().any(|t| t.destination == destination) {
            warn!("dropping download request, destination already queued");
            return None;
        }

        debug!(%kind, "enqueued");
        self.tasks.push(DownloadTask {
            source_url: url.to_string(),
            destination: PathBuf::from(destination),
            kind,
        });
        Some(kind)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queued tasks in enqueue order.
    #[must_use]
    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    /// Removes and returns every queued task; each is consumed exactly once.
    pub fn drain(&mut self) -> Vec<DownloadTask> {
        std::mem::take(&mut self.tasks)
    }
}
