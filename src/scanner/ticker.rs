//! Periodic task driver
//!
//! Fires a callback at a fixed interval on the tokio runtime until stopped.
//! Missed ticks are skipped rather than bunched up.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A cancellable fixed-interval timer
pub struct PeriodicTask {
    interval: Duration,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Create a stopped timer
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            cancel: None,
            handle: None,
        }
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the timer is armed
    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Arm the timer. The first tick fires one interval after this call.
    ///
    /// Returns false (and leaves the existing timer alone) if already running.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&mut self, mut on_tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return false;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => on_tick().await,
                }
            }
            debug!("Periodic task stopped");
        });

        self.cancel = Some(token);
        self.handle = Some(handle);
        debug!("Periodic task started ({:?})", period);
        true
    }

    /// Disarm the timer; safe to call when it was never started
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        // The task exits on its own at the next select; dropping the handle detaches it
        self.handle.take();
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
