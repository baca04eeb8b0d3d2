use crate::broker::PublisherChannel;
use crate::message::{Message, MessageBuilder, MessageType};
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Diverts a copy of any failed message to a configured dead-letter channel,
/// then propagates the original failure.
///
/// Dead-lettering is additive, not a substitute for error reporting: the
/// caller still sees the inner error so retry-exhaustion and unroutable
/// messages are not silently swallowed.
pub struct DeadLetterHandler {
    inner: Arc<dyn Handler>,
    dead_letter_channel: Arc<dyn PublisherChannel>,
}

#[derive(Serialize)]
struct DeadLetterRecord {
    #[serde(rename = "reasonError")]
    reason_error: String,
    #[serde(rename = "originalPayload")]
    original_payload: String,
    #[serde(rename = "originalHeaders")]
    original_headers: std::collections::HashMap<String, String>,
}

impl DeadLetterHandler {
    /// Wraps `inner`, diverting failures to `dead_letter_channel`.
    pub fn new(inner: Arc<dyn Handler>, dead_letter_channel: Arc<dyn PublisherChannel>) -> Self {
        Self {
            inner,
            dead_letter_channel,
        }
    }
}

#[async_trait]
impl Handler for DeadLetterHandler {
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        let original_headers = message.headers().all();
        let original_payload = String::from_utf8(message.payload().to_vec())
            .unwrap_or_else(|_| format!("<{} non-utf8 bytes>", message.payload().len()));

        let result = self.inner.handle(message).await;

        if let Err(error) = &result {
            if !error.is_cancelled() {
                let record = DeadLetterRecord {
                    reason_error: error.message().to_string(),
                    original_payload,
                    original_headers,
                };

                match serde_json::to_vec(&record) {
                    Ok(payload) => {
                        let dead_letter = MessageBuilder::new(MessageType::Document)
                            .payload(payload)
                            .build()
                            .expect("dead-letter envelope is always well-formed");

                        if let Err(publish_error) = self.dead_letter_channel.send(&dead_letter).await {
                            warn!(error = %publish_error, "failed to publish dead letter");
                        }
                    }
                    Err(serialize_error) => {
                        warn!(error = %serialize_error, "failed to serialize dead-letter record");
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PublishError;
    use crate::message::MessageBuilder;
    use crate::pipeline::handler::FnHandler;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct RecordingChannel {
        published: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl PublisherChannel for RecordingChannel {
        fn name(&self) -> &str {
            "deadLetter"
        }

        async fn send(&self, message: &Message) -> Result<(), PublishError> {
            self.published.lock().unwrap().push(message.payload().to_vec());
            Ok(())
        }
    }

    fn always_fails() -> Arc<dyn Handler> {
        Arc::new(FnHandler(|_: Message| async {
            Err(PipelineError::new("boom"))
        }))
    }

    #[tokio::test]
    async fn publishes_a_record_on_failure() {
        // Given
        let channel = Arc::new(RecordingChannel {
            published: Mutex::new(Vec::new()),
        });
        let handler = DeadLetterHandler::new(always_fails(), channel.clone());
        let message = MessageBuilder::new(MessageType::Command)
            .payload(b"{\"u\":\"a\"}".to_vec())
            .build()
            .unwrap();

        // When
        let result = handler.handle(message).await;

        // Then
        assert!(result.is_err());
        let published = channel.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let record: serde_json::Value = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(record["reasonError"], "boom");
        assert_eq!(record["originalPayload"], "{\"u\":\"a\"}");
    }

    #[tokio::test]
    async fn passes_through_on_success() {
        // Given
        let channel = Arc::new(RecordingChannel {
            published: Mutex::new(Vec::new()),
        });
        let succeeds: Arc<dyn Handler> = Arc::new(FnHandler(|m: Message| async { Ok(m) }));
        let handler = DeadLetterHandler::new(succeeds, channel.clone());
        let message = MessageBuilder::new(MessageType::Event).build().unwrap();

        // When
        handler.handle(message).await.unwrap();

        // Then
        assert_eq!(channel.published.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn cancellation_is_not_dead_lettered() {
        // Given
        let channel = Arc::new(RecordingChannel {
            published: Mutex::new(Vec::new()),
        });
        let cancelled: Arc<dyn Handler> = Arc::new(FnHandler(|_: Message| async {
            Err(PipelineError::cancelled(PipelineError::new("boom")))
        }));
        let handler = DeadLetterHandler::new(cancelled, channel.clone());
        let message = MessageBuilder::new(MessageType::Event).build().unwrap();

        // When
        let result = handler.handle(message).await;

        // Then
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(channel.published.lock().unwrap().len(), 0);
    }
}
