//! Retry policy shared by the pool builder and the connection layer.

use log::debug;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Wait the same delay after every failed attempt.
    Fixed(Duration),
    /// Double the delay after every failed attempt, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Bounded retry with a delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as one.
    pub max_attempts: usize,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
    /// Add up to this fraction of the delay as random jitter (0.0 disables).
    pub jitter: f64,
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times with a fixed delay.
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
            jitter: 0.0,
        }
    }

    /// A policy with exponentially growing delay.
    pub fn exponential(max_attempts: usize, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, max },
            jitter: 0.0,
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Set the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31) as u32;
                initial.saturating_mul(1u32 << shift).min(max)
            }
        };
        if self.jitter > 0.0 && !base.is_zero() {
            let extra = rand::rng().random_range(0.0..=self.jitter);
            base + base.mul_f64(extra)
        } else {
            base
        }
    }

    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error when every attempt fails. No delay is taken
    /// after the final attempt.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => return Err(err),
                Err(_) => {
                    let delay = self.delay_after(attempt);
                    debug!("attempt {}/{} failed, retrying in {:?}", attempt, attempts, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}
