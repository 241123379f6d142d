//! Bounded exponential back-off around any [`LlmProvider`].
//!
//! [`RetryingProvider`] re-issues a request only when the inner provider's
//! error reports [`RetryPolicy::Retryable`]. The schedule comes from
//! `reqwest-retry`'s [`ExponentialBackoff`]. A provider-supplied delay (from
//! `Retry-After` and friends) replaces the computed back-off for that attempt;
//! if it exceeds [`RetryConfig::max_backoff`] the error is returned instead of
//! retrying early.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy as BackoffPolicy};
use tracing::{debug, warn};

use pipeline::{LlmError, LlmProvider, LlmRequest, LlmResponse, RetryPolicy};

/// Back-off schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first; `1` disables retries.
    pub max_attempts: u32,
    /// Lower bound for the computed delay.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay, computed or provider-supplied.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// The exponential schedule for these bounds.
    pub fn policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .retry_bounds(self.initial_backoff.min(self.max_backoff), self.max_backoff)
            .build_with_max_retries(self.max_attempts.saturating_sub(1))
    }
}

/// Wraps a provider with retries on transient failures.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
    policy: ExponentialBackoff,
}

impl<P: LlmProvider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self {
            inner,
            policy: config.policy(),
            config,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let started = SystemTime::now();
        let mut past_retries = 0;
        loop {
            let err = match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let RetryPolicy::Retryable { after: hint } = err.retry_policy() else {
                return Err(err);
            };
            let scheduled = match self.policy.should_retry(started, past_retries) {
                RetryDecision::Retry { execute_after } => execute_after
                    .duration_since(SystemTime::now())
                    .unwrap_or_default(),
                RetryDecision::DoNotRetry => return Err(err),
            };
            let delay = match hint {
                Some(hint) if hint > self.config.max_backoff => {
                    debug!(
                        provider = self.inner.name(),
                        retry_after_ms = hint.as_millis() as u64,
                        "provider asked for a longer wait than allowed; not retrying"
                    );
                    return Err(err);
                }
                Some(hint) => hint,
                None => scheduled,
            };

            past_retries += 1;
            warn!(
                provider = self.inner.name(),
                attempt = past_retries,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "LLM request failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
