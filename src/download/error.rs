//! Error types for the download module.
//!
//! Two layers: [`FetchFailure`] says why a single HTTP exchange failed, and
//! [`DownloadError`] says which stage of a task it failed in, with the
//! context (URL, path, segment index) needed to report it.

use std::path::PathBuf;

use thiserror::Error;

/// Why one HTTP exchange (request + body) did not produce usable bytes.
#[derive(Debug, Error)]
pub enum FetchFailure {
    /// The URL could not be parsed.
    #[error("invalid URL")]
    InvalidUrl,

    /// Network-level error (DNS resolution, connection refused, TLS errors, body read).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request timed out before completion.
    #[error("timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("HTTP {0}")]
    Status(u16),

    /// The task was cancelled or hit its deadline while this exchange was pending.
    #[error("cancelled")]
    Cancelled,
}

impl FetchFailure {
    /// Maps a reqwest error, keeping timeouts distinguishable.
    #[must_use]
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error)
        }
    }
}

/// Errors that can end a download task.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The HLS manifest could not be fetched.
    #[error("failed to fetch manifest {url}: {source}")]
    ManifestFetch {
        /// Manifest URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: FetchFailure,
    },

    /// The HLS manifest could not be parsed into a media playlist.
    #[error("failed to parse manifest {url}: {reason}")]
    ManifestParse {
        /// Manifest URL.
        url: String,
        /// What was wrong with the document.
        reason: String,
    },

    /// The encryption key could not be fetched.
    #[error("failed to fetch key {url}: {source}")]
    KeyFetch {
        /// Key URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: FetchFailure,
    },

    /// The key or IV declared by the manifest is unusable.
    #[error("invalid key material from {url}: {reason}")]
    InvalidKey {
        /// Key URL.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A media segment could not be fetched.
    #[error("failed to fetch segment {index} ({url}): {source}")]
    SegmentFetch {
        /// Manifest position of the segment.
        index: usize,
        /// Segment URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: FetchFailure,
    },

    /// A media segment could not be decrypted.
    #[error("failed to decrypt segment {index}: {reason}")]
    DecryptFailed {
        /// Manifest position of the segment.
        index: usize,
        /// Cipher error description.
        reason: String,
    },

    /// A progressive file could not be fetched.
    #[error("failed to fetch {url}: {source}")]
    DirectFetch {
        /// Source URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: FetchFailure,
    },

    /// File system error while writing output.
    #[error("IO error writing to {path}: {source}")]
    Write {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL has no recognised media suffix.
    #[error("unsupported URL: {url}")]
    UnsupportedUrl {
        /// The rejected URL.
        url: String,
    },

    /// Assembly was finished while a segment index had never been delivered.
    #[error("segment {index} missing from assembly of {expected} segments")]
    MissingSegment {
        /// First index that was not written.
        index: usize,
        /// Number of segments the playlist declared.
        expected: usize,
    },

    /// A request header supplied by the caller is malformed.
    #[error("invalid request header: {header}")]
    InvalidHeader {
        /// The offending header line.
        header: String,
    },
}

impl DownloadError {
    /// Creates a manifest fetch error.
    pub fn manifest_fetch(url: impl Into<String>, source: FetchFailure) -> Self {
        Self::ManifestFetch {
            url: url.into(),
            source,
        }
    }

    /// Creates a manifest parse error.
    pub fn manifest_parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestParse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a key fetch error.
    pub fn key_fetch(url: impl Into<String>, source: FetchFailure) -> Self {
        Self::KeyFetch {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a segment fetch error.
    pub fn segment_fetch(index: usize, url: impl Into<String>, source: FetchFailure) -> Self {
        Self::SegmentFetch {
            index,
            url: url.into(),
            source,
        }
    }

    /// Creates a decryption error.
    pub fn decrypt_failed(index: usize, reason: impl Into<String>) -> Self {
        Self::DecryptFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Creates a direct fetch error.
    pub fn direct_fetch(url: impl Into<String>, source: FetchFailure) -> Self {
        Self::DirectFetch {
            url: url.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Creates an unsupported URL error.
    pub fn unsupported_url(url: impl Into<String>) -> Self {
        Self::UnsupportedUrl { url: url.into() }
    }

    /// Stable label for reports and JSON output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ManifestFetch { .. } => "manifest_fetch",
            Self::ManifestParse { .. } => "manifest_parse",
            Self::KeyFetch { .. } => "key_fetch",
            Self::InvalidKey { .. } => "invalid_key",
            Self::SegmentFetch { .. } => "segment_fetch",
            Self::DecryptFailed { .. } => "decrypt_failed",
            Self::DirectFetch { .. } => "direct_fetch",
            Self::Write { .. } => "write",
            Self::UnsupportedUrl { .. } => "unsupported_url",
            Self::MissingSegment { .. } => "missing_segment",
            Self::InvalidHeader { .. } => "invalid_header",
        }
    }

    /// Returns true when the error was caused by cancellation or a task deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::ManifestFetch {
                source: FetchFailure::Cancelled,
                ..
            } | Self::KeyFetch {
                source: FetchFailure::Cancelled,
                ..
            } | Self::SegmentFetch {
                source: FetchFailure::Cancelled,
                ..
            } | Self::DirectFetch {
                source: FetchFailure::Cancelled,
                ..
            }
        )
    }
}
