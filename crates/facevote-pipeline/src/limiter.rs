//! Minimum spacing between calls to one upstream client.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a fixed delay between the starts of consecutive calls.
///
/// The last-call timestamp is held under an async mutex for the whole wait,
/// so concurrent callers queue up and are released one interval apart.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call may start, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let wait = ready_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                tracing::trace!(?wait, "rate limiter waiting");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_call_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sequential_calls_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(30)));
        let start = Instant::now();
        let calls = (0..4).map(|_| {
            let l = Arc::clone(&limiter);
            async move { l.acquire().await }
        });
        futures::future::join_all(calls).await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
