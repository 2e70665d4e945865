//! Retry with exponential backoff for relay calls
//!
//! Only connection-level failures are retried. A response that was received,
//! even one carrying an error status, is handed back to the caller unless the
//! policy explicitly opts in to retrying provider 5xx answers.

use crate::error::{NewsAvatarError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for relay calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Upper bound for a single backoff delay
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Also retry when the provider answers with a 5xx status
    pub retry_on_server_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: Duration::from_secs(4),
            retry_on_server_error: false,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before the given retry (1-based) with a fresh random jitter
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen();
        self.backoff_delay_with_jitter(retry, jitter)
    }

    /// Delay before the given retry (1-based) for a jitter in `[0, 1)`
    ///
    /// `min(2^retry / 4 + jitter, max_delay)` seconds.
    pub fn backoff_delay_with_jitter(&self, retry: u32, jitter: f64) -> Duration {
        let exp = 2f64.powi(retry.min(16) as i32) / 4.0;
        let secs = (exp + jitter.clamp(0.0, 1.0)).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn should_retry(&self, err: &NewsAvatarError) -> bool {
        err.is_transient() || (self.retry_on_server_error && err.is_provider_server_error())
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy is exhausted
///
/// The closure receives the 1-based attempt number. When every attempt fails
/// with a retriable error the last one is wrapped in
/// [`NewsAvatarError::MaxRetriesExceeded`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt_no = 1;
    loop {
        match attempt(attempt_no).await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(&err) => {
                if attempt_no > policy.max_retries {
                    warn!(operation, attempts = attempt_no, "giving up: {}", err);
                    return Err(NewsAvatarError::MaxRetriesExceeded {
                        operation: operation.to_string(),
                        attempts: attempt_no,
                        source: Box::new(err),
                    });
                }

                let delay = policy.backoff_delay(attempt_no);
                debug!(
                    operation,
                    retry = attempt_no,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying. Error {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt_no += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
