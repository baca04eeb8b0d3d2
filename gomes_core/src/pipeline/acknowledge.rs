use crate::broker::ChannelMessageAcknowledgment;
use crate::message::Message;
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Commits the inbound raw message after the inner handler terminates,
/// regardless of its outcome.
///
/// Commit errors are logged but never surface to the caller: a failed
/// commit only means the transport will redeliver the message, which is
/// exactly the at-least-once behavior the consumer promises.
pub struct AcknowledgeHandler {
    inner: Arc<dyn Handler>,
    acknowledger: Option<Arc<dyn ChannelMessageAcknowledgment>>,
}

impl AcknowledgeHandler {
    /// Wraps `inner`. If `acknowledger` is `None`, this handler is a
    /// transparent pass-through (the gateway omits it entirely when no
    /// acknowledgment capability is available, but this also degrades
    /// gracefully if constructed anyway).
    pub fn new(inner: Arc<dyn Handler>, acknowledger: Option<Arc<dyn ChannelMessageAcknowledgment>>) -> Self {
        Self { inner, acknowledger }
    }
}

#[async_trait]
impl Handler for AcknowledgeHandler {
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        let raw_message = message.raw_message().cloned();

        let result = self.inner.handle(message).await;

        if let (Some(acknowledger), Some(raw_message)) = (&self.acknowledger, raw_message) {
            if let Err(commit_error) = acknowledger.commit_message(raw_message.as_ref()).await {
                warn!(error = %commit_error, "failed to commit message");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::CommitError;
    use crate::message::{MessageBuilder, MessageType};
    use crate::pipeline::handler::FnHandler;
    use pretty_assertions::assert_eq;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAcknowledger {
        commits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChannelMessageAcknowledgment for CountingAcknowledger {
        async fn commit_message(&self, _raw_message: &(dyn Any + Sync)) -> Result<(), CommitError> {
            self.commits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn message_with_raw() -> Message {
        MessageBuilder::new(MessageType::Event)
            .build()
            .unwrap()
            .with_raw_message(Arc::new(42u32))
    }

    #[tokio::test]
    async fn commits_on_success() {
        // Given
        let commits = Arc::new(AtomicUsize::new(0));
        let acknowledger: Arc<dyn ChannelMessageAcknowledgment> =
            Arc::new(CountingAcknowledger { commits: commits.clone() });
        let inner: Arc<dyn Handler> = Arc::new(FnHandler(|m: Message| async { Ok(m) }));
        let handler = AcknowledgeHandler::new(inner, Some(acknowledger));

        // When
        handler.handle(message_with_raw()).await.unwrap();

        // Then
        assert_eq!(commits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn commits_on_failure_too() {
        // Given
        let commits = Arc::new(AtomicUsize::new(0));
        let acknowledger: Arc<dyn ChannelMessageAcknowledgment> =
            Arc::new(CountingAcknowledger { commits: commits.clone() });
        let inner: Arc<dyn Handler> =
            Arc::new(FnHandler(|_: Message| async { Err(PipelineError::new("boom")) }));
        let handler = AcknowledgeHandler::new(inner, Some(acknowledger));

        // When
        let result = handler.handle(message_with_raw()).await;

        // Then
        assert!(result.is_err());
        assert_eq!(commits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn no_acknowledger_is_a_pass_through() {
        // Given
        let inner: Arc<dyn Handler> = Arc::new(FnHandler(|m: Message| async { Ok(m) }));
        let handler = AcknowledgeHandler::new(inner, None);

        // When
        let result = handler.handle(message_with_raw()).await;

        // Then
        assert!(result.is_ok());
    }
}
