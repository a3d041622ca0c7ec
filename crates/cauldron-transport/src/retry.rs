use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use cauldron_core::config::RetryConfig;
use cauldron_core::error::Result;
use cauldron_core::traits::{ChunkStream, SwarmTransport};
use cauldron_core::wire::{SwarmRequest, SwarmResponse};

/// A transport that retries transient failures with exponential backoff.
///
/// Only establishing a call is retried. Once a stream has started, errors
/// inside it are passed through untouched.
pub struct RetryingTransport {
    inner: Box<dyn SwarmTransport>,
    retry_config: RetryConfig,
}

impl RetryingTransport {
    pub fn new(inner: Box<dyn SwarmTransport>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }

    async fn with_retries<'a, T, F>(&'a self, request: &SwarmRequest, mut call: F) -> Result<T>
    where
        F: FnMut(SwarmRequest) -> BoxFuture<'a, Result<T>>,
    {
        let max_retries = self.retry_config.max_retries;
        let mut attempt = 0;
        loop {
            match call(request.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let backoff = calculate_backoff(attempt, &self.retry_config);
                    warn!(
                        attempt = attempt + 1,
                        max_retries,
                        kind = request.kind(),
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying swarm request"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl SwarmTransport for RetryingTransport {
    fn complete(&self, request: SwarmRequest) -> BoxFuture<'_, Result<SwarmResponse>> {
        Box::pin(async move {
            self.with_retries(&request, |req| self.inner.complete(req))
                .await
        })
    }

    fn stream(&self, request: SwarmRequest) -> BoxFuture<'_, Result<ChunkStream<'_>>> {
        Box::pin(async move {
            self.with_retries(&request, |req| self.inner.stream(req))
                .await
        })
    }
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("retry_config", &self.retry_config)
            .finish_non_exhaustive()
    }
}
