//! Reusable back-off iterator for `IOFailure` retries (spec §7):
//! base 1 s, factor 2, capped at 60 s, at most 3 attempts.

use std::time::Duration;

/// Exponential back-off schedule. `Backoff::default()` matches the
/// policy in spec §7 exactly; the constants are exposed so call sites
/// that need a different bound (none currently do) aren't forced to
/// hand-roll their own iterator.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    factor: u32,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2,
            cap: Duration::from_secs(60),
            max_attempts: 3,
            attempt: 0,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, factor: u32, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            factor,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Attempts already consumed.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let multiplier = self.factor.saturating_pow(self.attempt);
        let delay = self.base.saturating_mul(multiplier).min(self.cap);
        self.attempt += 1;
        Some(delay)
    }
}

/// Run `op` until it succeeds or the back-off schedule is exhausted.
/// Only errors for which `should_retry` returns true consume a slot in
/// the schedule; any other error returns immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut op: F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = Backoff::default();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) => match backoff.next() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}
