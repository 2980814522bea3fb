use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use aduana_core::config::ExtractorConfig;
use aduana_core::{DocumentRef, ExtractionCandidate};

use crate::adapters::{ExtractError, InvoiceExtractor};

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, not retries-after-first: 3 means three tries, then
    /// the entry is recorded as failed.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl From<&ExtractorConfig> for RetryPolicy {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            call_timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Wraps an extractor with per-call timeout and bounded exponential
/// backoff. Only transient failures are retried; a malformed document
/// comes back immediately.
pub struct RetryingExtractor {
    inner: Arc<dyn InvoiceExtractor>,
    policy: RetryPolicy,
}

impl RetryingExtractor {
    pub fn new(inner: Arc<dyn InvoiceExtractor>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.policy.base_delay.saturating_mul(1u32 << attempt.min(16));
        // jitter in [0.5, 1.0) so a burst of rate-limited calls does not
        // retry in lockstep
        let jitter = 0.5 + 0.5 * rand::random::<f64>();
        exponential.mul_f64(jitter)
    }
}

#[async_trait]
impl InvoiceExtractor for RetryingExtractor {
    async fn extract(
        &self,
        reference: &DocumentRef,
        bytes: &[u8],
    ) -> Result<ExtractionCandidate, ExtractError> {
        let mut attempt: u32 = 1;
        loop {
            let outcome =
                tokio::time::timeout(self.policy.call_timeout, self.inner.extract(reference, bytes))
                    .await;

            let error = match outcome {
                Ok(Ok(candidate)) => return Ok(candidate),
                Ok(Err(error)) if !error.is_transient() => return Err(error),
                Ok(Err(error)) => error,
                Err(_) => ExtractError::Transient {
                    reason: format!(
                        "extraction timed out after {}s",
                        self.policy.call_timeout.as_secs()
                    ),
                },
            };

            if attempt >= self.policy.max_attempts {
                tracing::error!(
                    reference = %reference,
                    attempts = attempt,
                    "extraction attempts exhausted: {error}"
                );
                return Err(error);
            }

            let delay = self.backoff_delay(attempt - 1);
            tracing::warn!(
                reference = %reference,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "transient extraction failure, will retry: {error}"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
