//! Fixed-interval backoff for reconnection

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Waits the same interval before every reconnect attempt, with no cap on
/// the number of attempts
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep for one interval.
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.interval) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_full_interval() {
        let backoff = FixedBackoff::new(Duration::from_secs(10));
        let started = tokio::time::Instant::now();
        assert!(backoff.wait(&CancellationToken::new()).await);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_does_not_grow() {
        let backoff = FixedBackoff::new(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            let started = tokio::time::Instant::now();
            backoff.wait(&cancel).await;
            assert_eq!(started.elapsed(), Duration::from_secs(10));
        }
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let backoff = FixedBackoff::new(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!backoff.wait(&cancel).await);
    }
}
