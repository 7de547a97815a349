use std::sync::Arc;

use super::error::UpstreamError;
use super::executor::{CallProfile, RetryingExecutor, UpstreamRequest, UpstreamResponse};
use super::registry::UpstreamRegistry;

/// Drives the executor across every upstream, starting with the active one.
pub struct FailoverOrchestrator {
    executor: Arc<RetryingExecutor>,
}

impl FailoverOrchestrator {
    pub fn new(executor: Arc<RetryingExecutor>) -> Self {
        Self { executor }
    }

    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        self.executor.registry()
    }

    pub fn executor(&self) -> &Arc<RetryingExecutor> {
        &self.executor
    }

    /// Returns the first non-retryable response (2xx or 4xx) from the
    /// rotation. An open breaker aborts the whole rotation; otherwise the last
    /// exhaustion error is returned once every upstream has been tried.
    pub async fn send(
        &self,
        request: &UpstreamRequest,
        profile: CallProfile,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let registry = self.registry();
        let rotation = registry.rotation();
        if rotation.is_empty() {
            return Err(UpstreamError::NoUpstreams);
        }

        let mut last_error = None;
        for index in rotation {
            match self.executor.execute(index, request, profile).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_circuit_open() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        upstream = %registry.base_url(index),
                        path = %request.path,
                        error = %e,
                        "Upstream exhausted, failing over"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(UpstreamError::NoUpstreams))
    }
}
