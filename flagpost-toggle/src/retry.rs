//! Retrying mutations that hit a transient store failure.

use flagpost_config::ToggleSettings;
use flagpost_core::FlagError;
use flagpost_log::{debug, warn};
use std::future::Future;
use std::time::Duration;

const LOG_TARGET: &str = "flagpost::retry";

/// Longest pause between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How often and how patiently a mutation is repeated.
///
/// Only errors for which [`FlagError::is_retryable`] holds are repeated. The
/// pause doubles after each failure, starting at the configured backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// `attempts` counts the first try; zero is treated as one.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::from_millis(50),
            max_backoff: MAX_BACKOFF,
        }
    }

    /// A single attempt.
    pub fn never() -> Self {
        Self::new(1)
    }

    pub fn from_settings(settings: &ToggleSettings) -> Self {
        Self::new(settings.retry_attempts).with_backoff(settings.retry_backoff())
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause before retry number `retry`, counted from 1.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails for good, or the attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, GaveUp>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = flagpost_core::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(target: LOG_TARGET, "succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    return Err(GaveUp { error, attempts: attempt });
                }
                Err(error) if attempt >= self.attempts => {
                    warn!(target: LOG_TARGET, "giving up after {} attempts: {}", attempt, error);
                    return Err(GaveUp { error, attempts: attempt });
                }
                Err(error) => {
                    let delay = self.delay_before(attempt);
                    debug!(
                        target: LOG_TARGET,
                        "attempt {} failed, retrying in {:?}: {}", attempt, delay, error
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ToggleSettings::default())
    }
}

/// The last error of a mutation that was not retried further.
#[derive(Debug)]
pub struct GaveUp {
    pub error: FlagError,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagpost_core::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> FlagError {
        FlagError::StoreUnavailable(StoreError::Timeout)
    }

    /// Fails with `error()` for the first `failures` calls.
    async fn failing(
        calls: &AtomicU32,
        failures: u32,
        error: fn() -> FlagError,
    ) -> flagpost_core::Result<u32> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures { Err(error()) } else { Ok(call) }
    }

    #[tokio::test]
    async fn test_first_success_is_returned() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3).with_backoff(Duration::ZERO);

        let value = policy.run(|| failing(&calls, 0, unavailable)).await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3).with_backoff(Duration::ZERO);

        let value = policy.run(|| failing(&calls, 2, unavailable)).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_attempts_run_out() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3).with_backoff(Duration::ZERO);

        let gave_up = policy.run(|| failing(&calls, 10, unavailable)).await.unwrap_err();
        assert_eq!(gave_up.attempts, 3);
        assert!(matches!(gave_up.error, FlagError::StoreUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5).with_backoff(Duration::ZERO);

        let gave_up = policy
            .run(|| failing(&calls, 10, || FlagError::UnknownFlag("nope".into())))
            .await
            .unwrap_err();
        assert_eq!(gave_up.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3).with_backoff(Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        policy.run(|| failing(&calls, 2, unavailable)).await.unwrap();

        // 100ms, then 200ms
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let policy = RetryPolicy::new(10)
            .with_backoff(Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(350));

        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(350));
        assert_eq!(policy.delay_before(64), Duration::from_millis(350));
    }

    #[test]
    fn test_from_settings() {
        let settings = ToggleSettings {
            retry_attempts: 0,
            retry_backoff_ms: 20,
        };
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.delay_before(1), Duration::from_millis(20));
        assert_eq!(RetryPolicy::never().attempts(), 1);
    }
}
