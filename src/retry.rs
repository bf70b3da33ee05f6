use std::future::Future;
use std::time::Duration;

/// Ceiling for a single backoff pause regardless of attempt count.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bounded exponential backoff for remote calls.
///
/// `max_attempts` counts the first try: a policy of 3 makes at most three
/// calls with two pauses between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Pause after the given failed attempt (1-based). Doubles per attempt,
    /// capped at [`MAX_BACKOFF`].
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted,
/// sleeping between attempts. The closure receives the 1-based attempt
/// number so callers can log it. Returns the last error on exhaustion.
pub async fn with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => return Err(err),
            Err(_) => {
                tokio::time::sleep(policy.backoff_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}
