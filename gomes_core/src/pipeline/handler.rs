use crate::message::Message;
use crate::pipeline::error::PipelineError;
use async_trait::async_trait;

/// A single link in the pipeline's handler chain.
///
/// Every wrapper — retry, dead-letter, acknowledge, reply-to, interceptor —
/// implements this same trait over an inner `Arc<dyn Handler>`, so the
/// gateway composes the whole chain as nested trait objects rather than a
/// fixed struct of struct fields.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Processes `message`, returning the (possibly transformed) message on
    /// success or a [`PipelineError`] on failure.
    async fn handle(&self, message: Message) -> Result<Message, PipelineError>;
}

/// Adapts a bare async closure into a [`Handler`]. Primarily useful for
/// registering simple interceptors and in tests.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Message, PipelineError>> + Send,
{
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        (self.0)(message).await
    }
}
