use crate::message::Message;
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tracing::warn;

/// Retries the inner handler using a fixed, ordered sequence of delays
/// between attempts.
///
/// An empty delay list disables retry outright: the inner handler is called
/// exactly once. Retry is cancellation-aware — a cancelled
/// [`MessageContext`](crate::message::MessageContext) aborts further
/// attempts immediately, surfacing as a [`PipelineError::is_cancelled`]
/// failure rather than being swallowed or retried.
pub struct RetryHandler {
    inner: Arc<dyn Handler>,
    delays_ms: Vec<u64>,
}

impl RetryHandler {
    /// Wraps `inner`, retrying after each delay in `delays_ms` in order.
    pub fn new(inner: Arc<dyn Handler>, delays_ms: Vec<u64>) -> Self {
        Self { inner, delays_ms }
    }
}

#[async_trait]
impl Handler for RetryHandler {
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        let context = message.context().clone();
        let mut last_error;

        match self.inner.handle(message.clone()).await {
            Ok(result) => return Ok(result),
            Err(error) => last_error = error,
        }

        for (attempt, &delay_ms) in self.delays_ms.iter().enumerate() {
            if context.is_cancelled() {
                return Err(PipelineError::cancelled(last_error));
            }

            select! {
                biased;
                _ = context.cancelled() => {
                    return Err(PipelineError::cancelled(last_error));
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }

            warn!(attempt = attempt + 1, delay_ms, "retrying after failure");

            match self.inner.handle(message.clone()).await {
                Ok(result) => return Ok(result),
                Err(error) => last_error = error,
            }
        }

        Err(last_error)
    }
}
