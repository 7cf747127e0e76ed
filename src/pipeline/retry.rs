//! Reusable retry policy: max attempts, linear-scaled backoff, and a
//! retryable-error predicate supplied per call site.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Publish-pipeline default: 3 attempts total, 500ms × attempt backoff.
    pub fn publish_default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }

    /// Wait before the attempt after `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * attempt
    }

    /// Runs `op` until it succeeds, fails non-retryably, or exhausts
    /// `max_attempts`. The closure receives the 1-based attempt number.
    pub async fn run<T, Op, Fut, P>(&self, mut op: Op, retryable: P) -> Result<T, AppError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
        P: Fn(&AppError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) && attempt < self.max_attempts => {
                    let wait = self.backoff(attempt);
                    tracing::debug!(
                        attempt,
                        max = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "retrying after retryable error"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
