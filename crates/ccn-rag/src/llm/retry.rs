//! Retry wrapper around a completion provider.
//!
//! Retries only transient failures, with capped exponential backoff. The
//! number of attempts is capped at [`MAX_ATTEMPTS`] so a slow upstream can
//! never multiply request latency by more than two.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{CompletionError, CompletionProvider, ProviderInfo, ResponseFormat};
use crate::config::LlmSettings;

pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.retry_base_delay_ms),
            Duration::from_millis(settings.retry_max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, Duration::from_millis(250), Duration::from_secs(2))
    }
}

pub struct RetryingProvider {
    inner: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn CompletionProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl CompletionProvider for RetryingProvider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        format: ResponseFormat,
    ) -> Result<String, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(prompt, max_tokens, format).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts() => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Completion call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn info(&self) -> ProviderInfo {
        self.inner.info()
    }
}
