//! Spinner shown on stderr while a run is in flight.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use stream_downloader::ConcurrencyLimiter;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_millis(100);
const REFRESH: Duration = Duration::from_millis(120);

/// Handle to a running spinner; [`finish`](Self::finish) clears it.
pub(crate) struct ProgressUi {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressUi {
    /// Starts the spinner when `enabled`, otherwise returns an inert handle.
    pub(crate) fn start(enabled: bool, limiter: ConcurrencyLimiter, tasks: usize) -> Self {
        let (stop, stopped) = watch::channel(false);
        let handle = enabled.then(|| tokio::spawn(render(limiter, tasks, stopped)));
        Self { stop, handle }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the spinner and waits until it has cleared its line.
    pub(crate) async fn finish(self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle {
            let _ = handle.await;
        }
    }
}

async fn render(limiter: ConcurrencyLimiter, tasks: usize, mut stopped: watch::Receiver<bool>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(TICK);

    while !*stopped.borrow() {
        spinner.set_message(format!(
            "{tasks} download(s), {}/{} requests in flight",
            limiter.in_flight(),
            limiter.capacity()
        ));
        // Either a refresh tick or the stop signal, whichever comes first.
        if let Ok(Err(_)) = tokio::time::timeout(REFRESH, stopped.changed()).await {
            break;
        }
    }

    spinner.finish_and_clear();
}
