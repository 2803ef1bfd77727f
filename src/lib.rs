//! Stream Downloader Library
//!
//! This library provides the core functionality for the stream downloader,
//! which turns already-discovered media URLs (HLS manifests and progressive
//! `.mp4` files) into finished files on local disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - HTTP client, shared concurrency limiter, direct fetcher
//!   and the engine that runs a queue
//! - [`hls`] - Playlist and key resolution, segment fetch/decrypt, ordered
//!   assembly
//! - [`queue`] - URL classification and the in-memory task queue
//!
//! Discovering playable URLs (browser automation, scraping) happens outside
//! this crate; session headers captured there are passed in through
//! [`HttpClient::with_headers`].

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod hls;
pub mod queue;
mod user_agent;

// Re-export commonly used types
pub use download::{
    ConcurrencyLimiter, DEFAULT_CONCURRENCY, DirectFetcher, DownloadEngine, DownloadError,
    DownloadReport, EngineError, EngineOptions, FetchFailure, HttpClient, TaskOutcome,
};
pub use hls::HlsPipeline;
pub use queue::{DownloadQueue, DownloadTask, TaskKind, classify_url};
