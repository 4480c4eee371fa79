//! Transport abstraction for running chat turns

use std::time::Duration;

use async_trait::async_trait;
use stru_api::{
    CompletionClient, CompletionRequest, Error, Result, SessionContext, StreamEventStream,
};
use tokio_util::sync::CancellationToken;

/// Retry configuration for opening a completion stream.
///
/// Only the connect phase is retried; once bytes have been streamed a failure
/// is final for the turn.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Opens the decoded event stream for one turn
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and stream the answer until `[DONE]`, source end or `cancel`.
    ///
    /// Returns [`Error::Cancelled`] when `cancel` fires before the stream opens.
    async fn run(
        &self,
        request: CompletionRequest,
        session: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<StreamEventStream>;
}

/// Transport that calls the completion endpoint over HTTP
pub struct HttpTransport {
    client: CompletionClient,
    retry_config: RetryConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(client: CompletionClient) -> Self {
        Self {
            client,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn run(
        &self,
        request: CompletionRequest,
        session: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<StreamEventStream> {
        let mut attempt = 0u32;
        loop {
            match self.client.stream(&request, session, cancel.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    if attempt >= self.retry_config.max_retries || !e.is_retryable() {
                        return Err(e);
                    }

                    let delay = self.retry_config.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Completion request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.retry_config.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
