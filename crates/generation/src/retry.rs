use fable_traits::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Attempt budget, backoff and per-attempt timeouts for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub base_timeout: Duration,
    /// Added to the timeout for every attempt after the first.
    pub timeout_step: Duration,
    /// Random pause before each attempt, spreading bursts across a rate window.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
            base_timeout: Duration::from_secs(60),
            timeout_step: Duration::from_secs(30),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no pauses.
    pub fn once(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1,
            base_timeout: timeout,
            timeout_step: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_min = Duration::ZERO;
        self.jitter_max = Duration::ZERO;
        self
    }

    /// Wait after the `attempt`th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(self.multiplier.max(1).saturating_pow(exp))
    }

    /// Timeout applied to the `attempt`th call (1-based).
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout
            .saturating_add(self.timeout_step.saturating_mul(attempt.saturating_sub(1)))
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Each call is bounded by [`Self::timeout_for`].
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let pause = self.jitter();
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let limit = self.timeout_for(attempt);
            let result = match tokio::time::timeout(limit, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(limit)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                log::warn!("{}: attempt {}/{} failed permanently: {}", label, attempt, attempts, err);
                return Err(err);
            }
            if attempt >= attempts {
                log::warn!("{}: giving up after {} attempts: {}", label, attempts, err);
                return Err(err);
            }

            let delay = self.delay_after(attempt);
            log::warn!(
                "{}: attempt {}/{} failed ({}), retrying in {:?}",
                label,
                attempt,
                attempts,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
