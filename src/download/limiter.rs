//! Process-wide bound on simultaneous network operations.
//!
//! One [`ConcurrencyLimiter`] is shared by every task of an engine run.
//! Direct downloads hold a permit for their whole transfer; manifest, key and
//! segment fetches hold one only for the request and body read.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::engine::EngineError;
use super::error::FetchFailure;

/// Counting gate shared by all queued tasks.
///
/// Cloning is cheap and every clone refers to the same permit pool.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// A held permit. Dropping it (or calling [`release`](Self::release)) returns
/// the permit to the pool, so every exit path releases exactly once.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `capacity` permits.
    ///
    /// Capacity is not validated here; [`DownloadEngine::new`](super::DownloadEngine::new)
    /// enforces the allowed range.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Configured number of permits.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once since creation.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Waits until a permit is available.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the pool was closed.
    pub async fn acquire(&self) -> Result<LimiterPermit, EngineError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::SemaphoreClosed)?;

        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        trace!(in_flight = now, capacity = self.capacity, "permit acquired");

        Ok(LimiterPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Waits for a permit unless `token` is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure::Cancelled`] if the token fires or the pool was closed.
    pub async fn acquire_or_cancel(
        &self,
        token: &CancellationToken,
    ) -> Result<LimiterPermit, FetchFailure> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(FetchFailure::Cancelled),
            permit = self.acquire() => permit.map_err(|_| FetchFailure::Cancelled),
        }
    }
}

impl LimiterPermit {
    /// Returns the permit to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
