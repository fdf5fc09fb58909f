use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use dossier_common::DossierError;

/// Max attempts for a collaborator call, first try included.
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Base backoff. Delay for attempt k is base * 2^(k-1) + jitter, capped.
pub const DEFAULT_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(8);

/// Bounded retry for transient collaborator failures. Non-transient errors
/// return immediately; after the last attempt the final error is returned.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            base: DEFAULT_BASE,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base: Duration, max_wait: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base,
            max_wait,
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff before retrying after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base.saturating_mul(1u32 << exponent);
        let base_ms = self.base.as_millis() as u64;
        let jitter = if base_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..base_ms))
        };
        (backoff + jitter).min(self.max_wait)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, DossierError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DossierError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
