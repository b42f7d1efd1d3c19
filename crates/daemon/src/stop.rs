//! Cooperative shutdown signal shared by the daemon and its workers.
//!
//! The signal only ever moves from unset to set. Workers check it at the top
//! of each iteration and sleep through [`StopSignal::sleep`], which returns as
//! soon as the signal is set instead of waiting out the full interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Monotonic stop flag, cheap to clone
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal. Setting it again is a no-op.
    pub fn set(&self) {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is set
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` or until the signal is set, whichever comes first.
    ///
    /// Returns `true` if the signal is set when the sleep ends.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.wait() => true,
            _ = tokio::time::sleep(duration) => self.is_set(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_signal_starts_unset() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
    }

    #[test]
    fn test_set_is_monotonic_and_shared() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        clone.set();
        clone.set();
        assert!(stop.is_set());
        assert!(clone.is_set());
    }

    #[tokio::test]
    async fn test_sleep_runs_full_interval_when_unset() {
        let stop = StopSignal::new();
        let stopped = stop.sleep(Duration::from_millis(20)).await;
        assert!(!stopped);
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_stop() {
        let stop = StopSignal::new();
        let setter = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set();
        });

        let start = Instant::now();
        let stopped = stop.sleep(Duration::from_secs(30)).await;

        assert!(stopped);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_set() {
        let stop = StopSignal::new();
        stop.set();
        tokio::time::timeout(Duration::from_secs(1), stop.wait())
            .await
            .expect("wait should return once set");
    }
}
