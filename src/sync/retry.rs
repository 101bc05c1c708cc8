//! Fixed-delay retry policy
//!
//! Each call site builds its own [`RetryPolicy`] from an attempt budget and a
//! delay. The policy retries any error, waits the same delay between
//! attempts and returns the last error once the budget is spent.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Attempt budgets per operation class
pub mod attempts {
    pub const AUTHENTICATE: u32 = 3;
    pub const IMPORT_BUNDLE: u32 = 5;
    pub const PATCH_DOCUMENT: u32 = 5;
    pub const TRIGGER_REBUILD: u32 = 5;
    pub const CLOSE_SESSION: u32 = 3;
}

/// Bounded-attempt retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; an attempt budget of zero is raised to one
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Execute an async operation with retry logic
    ///
    /// The operation is called up to `attempts` times. The first success is
    /// returned immediately; otherwise the error of the final attempt is
    /// returned.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if attempt >= self.attempts {
                        debug!(
                            attempts = attempt,
                            error = %err,
                            "Retry attempts exhausted"
                        );
                        return Err(err);
                    }

                    debug!(
                        attempt = attempt + 1,
                        max_attempts = self.attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "Retrying"
                    );

                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
