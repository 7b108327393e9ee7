//! Periodic refresh of a sensor value.
//!
//! The timer fires every `interval` and runs the supplied refresh. Calling
//! [`PullTimer::reset`] pushes the next firing a full interval into the
//! future, so a value fetched on demand is not immediately fetched again.

use log::debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct PullTimer {
    interval: Duration,
    reset: Arc<Notify>,
}

impl PullTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            reset: Arc::new(Notify::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restart the countdown from now.
    ///
    /// A reset issued while a refresh is running takes effect once it
    /// returns.
    pub fn reset(&self) {
        self.reset.notify_one();
    }

    /// Spawn the timer task. It runs until `cancel` fires.
    pub fn start<F, Fut>(&self, cancel: CancellationToken, refresh: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let interval = self.interval;
        let reset = Arc::clone(&self.reset);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = reset.notified() => {
                        debug!("Pull timer reset");
                        continue;
                    }
                    _ = tokio::time::sleep(interval) => refresh().await,
                }
            }
            debug!("Pull timer stopped");
        })
    }
}
