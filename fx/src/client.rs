//! Feed fetching with retry and exponential backoff.
//!
//! ```text
//! Idle -> Attempting(k) -> Success
//!                       -> Retryable  -> (wait base * 2^(k-1)) -> Attempting(k+1)
//!                       -> NonRetryable (4xx, redirects, bad request)
//!                       -> Exhausted (k == max_attempts)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::transport::Transport;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Fetches raw feed bodies over a shared [`Transport`].
#[derive(Clone)]
pub struct FeedClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl FeedClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET `url`, retrying server and network failures.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_with_cancel(url, &CancellationToken::new()).await
    }

    /// Like [`FeedClient::fetch`], but gives up as soon as `cancel` fires,
    /// whether a request or a backoff wait is pending.
    pub async fn fetch_with_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                outcome = self.attempt(url) => outcome,
            };

            let err = match outcome {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "Fetched feed");
                    return Ok(body);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(url, attempt, error = %err, "Not retrying");
                return Err(err);
            }

            if attempt >= max_attempts {
                return Err(FetchError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Feed request failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.transport.get(url).await?;

        if response.is_success() {
            Ok(response.body)
        } else if response.is_client_error() {
            Err(FetchError::ClientStatus {
                status: response.status,
            })
        } else {
            Err(FetchError::ServerStatus {
                status: response.status,
            })
        }
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
