//! Exponential backoff with jitter for model calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Longest a single attempt may run.
    pub attempt_timeout: Duration,
    /// Wall-clock budget for all attempts and waits together.
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(30),
            budget: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: base × 2^(attempt-1), plus up to 10% jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter_ms = (exp.as_millis() / 10) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, the attempts
/// run out, or the budget is spent. The last error is returned.
///
/// `op` receives the timeout for that attempt: the attempt timeout, shortened
/// to whatever is left of the budget.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    provider: &str,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let deadline = Instant::now() + policy.budget;
    let mut attempt = 1;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let err = match op(policy.attempt_timeout.min(remaining)).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !err.is_retryable() || attempt >= policy.max_attempts {
            return Err(err);
        }

        let wanted = match &err {
            LlmError::RateLimited {
                retry_after: Some(after),
                ..
            } => *after,
            _ => policy.delay_after(attempt),
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if wanted >= remaining {
            warn!(
                provider = provider,
                attempt,
                wait_ms = wanted.as_millis() as u64,
                remaining_ms = remaining.as_millis() as u64,
                error = %err,
                "Model call failed, no time left to retry"
            );
            return Err(err);
        }

        warn!(
            provider = provider,
            attempt,
            max_attempts = policy.max_attempts,
            wait_ms = wanted.as_millis() as u64,
            error = %err,
            "Model call failed, retrying"
        );
        tokio::time::sleep(wanted).await;
        attempt += 1;
    }
}
