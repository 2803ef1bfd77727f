//! Download engine driving every queued task to a terminal state.
//!
//! This module provides the `DownloadEngine` which runs all queued tasks
//! concurrently, one Tokio task each, with every network operation gated by a
//! single shared [`ConcurrencyLimiter`].
//!
//! # Example
//!
//! ```no_run
//! use stream_downloader::download::{DownloadEngine, EngineOptions, HttpClient};
//! use stream_downloader::queue::DownloadQueue;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut queue = DownloadQueue::new();
//! queue.enqueue("https://cdn.example/ep1/index.m3u8", "./ep1.ts");
//! queue.enqueue("https://cdn.example/trailer.mp4", "./trailer.mp4");
//!
//! let engine = DownloadEngine::new(EngineOptions::default())?;
//! let report = engine.process_all(&mut queue, &HttpClient::new()).await;
//! println!("Completed: {}, Failed: {}", report.completed(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use super::constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::{ConcurrencyLimiter, DirectFetcher, DownloadError, HttpClient};
use crate::hls::HlsPipeline;
use crate::queue::{DownloadQueue, DownloadTask, TaskKind};

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum simultaneous network operations across all tasks.
    pub concurrency: usize,
    /// Per-task deadline; an expired task fails as cancelled.
    pub task_timeout: Option<Duration>,
    /// Segments an HLS task may fetch ahead of its writer; `None` keeps the
    /// pipeline default.
    pub segment_window: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            task_timeout: None,
            segment_window: None,
        }
    }
}

/// Terminal state of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The destination file is complete.
    Completed {
        /// Bytes written to the destination.
        bytes: u64,
    },
    /// The task failed; no file was left at the destination.
    Failed {
        /// Stable error label, see [`DownloadError::kind`].
        kind: String,
        /// Human-readable error.
        reason: String,
    },
}

impl TaskOutcome {
    fn from_result(result: &Result<u64, DownloadError>) -> Self {
        match result {
            Ok(bytes) => Self::Completed { bytes: *bytes },
            Err(e) => Self::Failed {
                kind: e.kind().to_string(),
                reason: e.to_string(),
            },
        }
    }

    /// Returns true for [`TaskOutcome::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Per-destination results of one [`DownloadEngine::process_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DownloadReport {
    outcomes: HashMap<PathBuf, TaskOutcome>,
}

impl DownloadReport {
    /// Outcome recorded for `destination`.
    #[must_use]
    pub fn get(&self, destination: &Path) -> Option<&TaskOutcome> {
        self.outcomes.get(destination)
    }

    /// Number of completed tasks.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_completed()).count()
    }

    /// Number of failed tasks.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.completed()
    }

    /// Number of tasks that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true when every task completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.failed() == 0
    }

    /// Iterates over `(destination, outcome)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &TaskOutcome)> {
        self.outcomes.iter()
    }

    /// Consumes the report into its map.
    #[must_use]
    pub fn into_map(self) -> HashMap<PathBuf, TaskOutcome> {
        self.outcomes
    }
}

/// Download engine for concurrent direct and HLS downloads.
///
/// # Concurrency Model
///
/// - Each queued task runs in its own Tokio task, started immediately
/// - HLS tasks fan out further, one Tokio task per segment, at most
///   `segment_window` ahead of the next segment to be written
/// - Every manifest, key, segment and direct fetch holds a limiter permit,
///   so in-flight network operations never exceed `concurrency`
/// - Permits are released automatically when fetches complete (RAII)
///
/// # Failure isolation
///
/// - A failing task records `Failed` for its destination only
/// - Siblings keep running; nothing is retried
#[derive(Debug)]
pub struct DownloadEngine {
    limiter: ConcurrencyLimiter,
    options: EngineOptions,
    cancel: CancellationToken,
}

impl DownloadEngine {
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug")]
    pub fn new(options: EngineOptions) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: options.concurrency,
            });
        }

        debug!(
            concurrency = options.concurrency,
            task_timeout_ms = options.task_timeout.map(|d| d.as_millis()),
            "creating download engine"
        );

        Ok(Self {
            limiter: ConcurrencyLimiter::new(options.concurrency),
            options,
            cancel: CancellationToken::new(),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.options.concurrency
    }

    /// Returns the shared limiter (for observing in-flight counts).
    #[must_use]
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Token that cancels every task of the current and future runs.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every queued task to completion or failure.
    ///
    /// The queue is drained; each task is consumed exactly once. Individual
    /// failures never abort the run, they are recorded in the report.
    #[instrument(skip(self, queue, client), fields(tasks = queue.len()))]
    pub async fn process_all(&self, queue: &mut DownloadQueue, client: &HttpClient) -> DownloadReport {
        let tasks = queue.drain();
        let mut report = DownloadReport::default();
        let mut running = JoinSet::new();

        info!("starting queue processing");

        for task in tasks {
            let client = client.clone();
            let limiter = self.limiter.clone();
            let token = self.cancel.child_token();
            let options = self.options;
            let span = info_span!("task", kind = %task.kind, url = %task.source_url);

            running.spawn(
                async move {
                    let result = run_with_deadline(&task, client, limiter, token, options).await;
                    match &result {
                        Ok(bytes) => info!(bytes, "download completed"),
                        Err(e) if e.is_cancelled() => info!(error = %e, "download cancelled"),
                        Err(e) => warn!(error = %e, "download failed"),
                    }
                    (task.destination, TaskOutcome::from_result(&result))
                }
                .instrument(span),
            );
        }

        debug!(task_count = running.len(), "waiting for downloads to complete");

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((destination, outcome)) => {
                    report.outcomes.insert(destination, outcome);
                }
                // Ignore JoinError - task panics are logged but don't fail the batch
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        info!(
            completed = report.completed(),
            failed = report.failed(),
            total = report.total(),
            peak_in_flight = self.limiter.peak_in_flight(),
            "queue processing complete"
        );

        report
    }
}

/// Runs one task, cancelling it when its deadline passes.
///
/// On expiry the task is not dropped; its token is cancelled and the task is
/// awaited so it can remove partial output on its own error path.
async fn run_with_deadline(
    task: &DownloadTask,
    client: HttpClient,
    limiter: ConcurrencyLimiter,
    token: CancellationToken,
    options: EngineOptions,
) -> Result<u64, DownloadError> {
    let work = run_task(task, client, limiter, &token, options.segment_window);
    tokio::pin!(work);

    let Some(timeout) = options.task_timeout else {
        return work.await;
    };

    tokio::select! {
        result = &mut work => result,
        () = tokio::time::sleep(timeout) => {
            warn!(timeout_ms = timeout.as_millis(), "task deadline exceeded, cancelling");
            token.cancel();
            work.await
        }
    }
}

async fn run_task(
    task: &DownloadTask,
    client: HttpClient,
    limiter: ConcurrencyLimiter,
    token: &CancellationToken,
    segment_window: Option<usize>,
) -> Result<u64, DownloadError> {
    match task.kind {
        TaskKind::Direct => {
            DirectFetcher::new(client, limiter)
                .fetch(&task.source_url, &task.destination, token)
                .await
        }
        TaskKind::Hls => {
            let pipeline = HlsPipeline::new(client, limiter);
            let pipeline = match segment_window {
                Some(window) => pipeline.with_window(window),
                None => pipeline,
            };
            pipeline
                .download(&task.source_url, &task.destination, token)
                .await
        }
    }
}
