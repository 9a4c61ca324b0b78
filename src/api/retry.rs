//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::error::{ApiError, ApiResult};

/// Retry policy for a single logical request.
///
/// `retries` is the number of re-attempts after the first, so the default
/// of 3 allows at most 4 attempts total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub retries: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      retries: 3,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  pub fn new(retries: u32, base_delay: Duration) -> Self {
    Self { retries, base_delay }
  }

  /// Backoff before re-attempting: `base_delay * 2^attempt`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    self.base_delay * 2u32.saturating_pow(attempt)
  }
}

/// Drive `op` until it succeeds, fails non-retryably, or the attempt
/// budget runs out.
///
/// `op` receives the zero-based attempt number. Only errors whose
/// [`ApiError::is_retryable`] is true are re-attempted; everything else
/// surfaces on first occurrence.
pub async fn run<T, F, Fut>(policy: RetryPolicy, op: F) -> ApiResult<T>
where
  F: Fn(u32) -> Fut,
  Fut: Future<Output = ApiResult<T>>,
{
  let mut attempt = 0u32;
  loop {
    match op(attempt).await {
      Ok(value) => return Ok(value),
      Err(err) if err.is_retryable() && attempt < policy.retries => {
        let delay = policy.delay_for(attempt);
        debug!(
          attempt = attempt + 1,
          delay_ms = delay.as_millis() as u64,
          error = %err,
          "request failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(err) => return Err(err),
    }
  }
}
