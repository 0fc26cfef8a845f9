//! Timeout and retry around the model call.

use std::time::Duration;

use tracing::warn;

use super::llm::CompletionModel;
use super::prompt::ExtractionRequest;
use crate::error::{ExtractionError, ModelError};
use crate::models::config::RetryConfig;

/// How the model call is bounded and retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Linear backoff step; the n-th retry waits `n * backoff`.
    pub backoff: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, timeout: Duration) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            timeout,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.backoff * retry
    }
}

/// Reply text plus the number of attempts it took.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub attempts: u32,
}

/// Call `model`, retrying transport failures and timeouts.
///
/// Returned replies are never retried, whatever their content.
pub async fn complete_with_retry(
    model: &dyn CompletionModel,
    request: &ExtractionRequest,
    policy: &RetryPolicy,
) -> Result<Completion, ExtractionError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.timeout, model.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(policy.timeout)),
        };

        let error = match outcome {
            Ok(text) => return Ok(Completion { text, attempts: attempt }),
            Err(e) => e,
        };

        if !error.is_retryable() {
            return Err(ExtractionError::Rejected(error));
        }

        if attempt > policy.max_retries {
            return Err(ExtractionError::TransportExhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay(attempt);
        warn!(
            "Model call attempt {} failed ({}), retrying after {}ms",
            attempt,
            error,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}
