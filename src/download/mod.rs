//! HTTP plumbing and the task engine.
//!
//! This module provides the shared HTTP client, the concurrency limiter every
//! network operation goes through, the progressive (direct) fetcher, and the
//! engine that runs a whole queue.
//!
//! # Features
//!
//! - Streaming direct downloads (memory-efficient for large files)
//! - One global cap on in-flight requests, shared by all tasks
//! - Opaque per-session headers attached to every request
//! - Configurable timeouts (30s connect, 5min read by default)
//! - Structured error types with full context
//! - Partial output written to `<dest>.part`, renamed only on success
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use stream_downloader::download::{ConcurrencyLimiter, DirectFetcher, HttpClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = DirectFetcher::new(HttpClient::new(), ConcurrencyLimiter::new(6));
//! let bytes = fetcher
//!     .fetch(
//!         "https://cdn.example/trailer.mp4",
//!         Path::new("./trailer.mp4"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("Downloaded {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod direct;
mod engine;
mod error;
mod limiter;

pub use client::{HttpClient, header_map_from_lines, parse_header_line, read_body};
pub use constants::DEFAULT_CONCURRENCY;
pub use direct::{DirectFetcher, partial_path};
pub use engine::{DownloadEngine, DownloadReport, EngineError, EngineOptions, TaskOutcome};
pub use error::{DownloadError, FetchFailure};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
