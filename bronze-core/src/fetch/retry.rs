//! Retry with exponential backoff.
//!
//! The delay after failed attempt `n` is `multiplier * 2^(n-1)` seconds,
//! clamped to `[min_delay, max_delay]`. With the defaults (×1, 2s, 10s) the
//! schedule is 2s, 2s, 4s, 8s, 10s, 10s, ...

use std::fmt::Display;
use std::time::Duration;

/// Explicit retry policy applied around a single fallible call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 0.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let secs = self.multiplier * exp;
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let clamped = if secs.is_nan() { min } else { secs.min(max).max(min) };
        Duration::try_from_secs_f64(clamped).unwrap_or(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Blocks the calling thread between attempts.
    pub fn run<T, E: Display>(
        &self,
        op: impl FnMut(u32) -> Result<T, E>,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        self.run_with_sleep(op, retryable, std::thread::sleep)
    }

    /// Same as [`run`](Self::run) with an injectable sleep function.
    pub fn run_with_sleep<T, E: Display>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        retryable: impl Fn(&E) -> bool,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, E> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, backing off"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    if attempt >= max_attempts && retryable(&e) {
                        tracing::error!(attempt, error = %e, "retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
