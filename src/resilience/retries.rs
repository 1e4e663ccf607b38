//! Bounded polling.

use std::time::Duration;

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Run `fetch` until it yields a value or the attempts run out.
    ///
    /// `Ok(None)` means every attempt came back empty. Errors from `fetch`
    /// abort immediately.
    pub async fn poll<T, E, F>(&self, what: &str, mut fetch: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        for attempt in 1..=self.attempts {
            if let Some(value) = fetch()? {
                return Ok(Some(value));
            }
            if attempt < self.attempts {
                tracing::info!(
                    what,
                    attempt,
                    max_attempts = self.attempts,
                    retry_in_ms = self.interval.as_millis() as u64,
                    "Value not available yet, retrying"
                );
                tokio::time::sleep(self.interval).await;
            }
        }
        Ok(None)
    }
}
