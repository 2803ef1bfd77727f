//! Constants for the download module (timeouts, chunking, limiter bounds).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Write buffer size used when streaming a progressive file to disk.
pub const DIRECT_CHUNK_SIZE: usize = 64 * 1024;

/// Suffix appended to a destination path while it is being written.
pub const PARTIAL_SUFFIX: &str = "part";

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous network operations.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Segments an HLS task may have in flight or buffered ahead of the next
/// index to be written. Raised to the limiter capacity when that is larger.
pub const SEGMENT_WINDOW: usize = 32;
