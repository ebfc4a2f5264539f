//! Retry with exponential backoff for collaborator calls.
//!
//! Only transient failures (see [`CollaboratorError::is_transient`]) are
//! retried. Delays double from `base_delay` up to `max_delay`, with up to 25%
//! random jitter added so that concurrent callers do not retry in lockstep.

use std::future::Future;
use std::time::Duration;

use morphika_types::error::CollaboratorError;
use morphika_types::models::RetryConfig;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff settings for one class of collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt + 1` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let calculated_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt)).min(max_ms);

        if !self.jitter || calculated_ms == 0 {
            return Duration::from_millis(calculated_ms);
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=calculated_ms / 4);
        Duration::from_millis(calculated_ms.saturating_add(jitter_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: true,
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
///
/// `operation` is only used for logging.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt = 0_u32;
    loop {
        match call().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("[Retry] {} succeeded after {} retries", operation, attempt);
                }
                return Ok(value);
            },
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "[Retry] {} failed (attempt {}/{}), retrying in {}ms: {}",
                    operation,
                    attempt + 1,
                    policy.max_attempts,
                    delay.as_millis(),
                    e
                );
                sleep(delay).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
