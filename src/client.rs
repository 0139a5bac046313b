//! Retrying wrapper around a [`SynthesisBackend`].

use std::sync::Arc;
use std::time::Duration;

use crate::error::{BackendError, SynthesisBackendError};
use crate::{SynthesisBackend, SynthesisRequest};

/// Number of leading characters of a chunk shown in log lines.
const LOG_PREVIEW_CHARS: usize = 50;

/// Retry policy for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Budget for a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt that follows attempt `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt + 1)
            .unwrap_or(Duration::MAX)
    }
}

/// Sends one chunk with bounded retries and linear backoff.
#[derive(Clone)]
pub struct SynthesisClient {
    backend: Arc<dyn SynthesisBackend>,
    policy: RetryPolicy,
}

impl SynthesisClient {
    pub fn new(backend: Arc<dyn SynthesisBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Synthesize one chunk. Every attempt failure is logged and retried;
    /// only exhaustion of the attempt budget is returned as an error.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Vec<u8>, SynthesisBackendError> {
        let attempts = self.policy.max_attempts.max(1);
        let preview: String = request.text.chars().take(LOG_PREVIEW_CHARS).collect();
        let mut last = BackendError::EmptyResponse;

        for attempt in 0..attempts {
            log::info!(
                "Attempt {}/{}: sending text '{}...' ({} characters)",
                attempt + 1,
                attempts,
                preview,
                request.text.chars().count()
            );

            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, self.backend.synthesize(request))
                    .await
                    .unwrap_or(Err(BackendError::Timeout(self.policy.attempt_timeout)));

            match outcome {
                Ok(bytes) => {
                    log::debug!("Attempt {} returned {} bytes", attempt + 1, bytes.len());
                    return Ok(bytes);
                }
                Err(e) => {
                    log::warn!("Attempt {}/{} failed: {}", attempt + 1, attempts, e);
                    last = e;
                }
            }

            if attempt + 1 < attempts {
                let delay = self.policy.delay_after(attempt);
                log::info!("Retrying in {:?}...", delay);
                tokio::time::sleep(delay).await;
            }
        }

        log::error!("Failed to generate speech after {attempts} attempts");
        Err(SynthesisBackendError { attempts, last })
    }
}
