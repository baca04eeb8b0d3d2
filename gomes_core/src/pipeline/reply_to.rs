use crate::broker::PublisherChannel;
use crate::message::{Message, MessageBuilder, MessageType};
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;
use crate::registry::Registry;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Sends a reply to the channel named in a message's `replyTo` header, once
/// the inner handler has produced a terminal result.
///
/// Only meaningful for [`Command`](MessageType::Command)/[`Query`](MessageType::Query)
/// messages; the gateway only inserts this handler when the inbound
/// adapter's declarations request it.
pub struct ReplyToHandler {
    inner: Arc<dyn Handler>,
    channels: Arc<Registry<Arc<dyn PublisherChannel>>>,
}

/// Raised when a reply-required message carries no `replyTo` header.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("message has no replyTo channel")]
pub struct NoReplyChannelError;

/// Raised when the `replyTo` header names an entry that is not a publisher
/// channel.
#[derive(Debug, Error)]
#[error("replyTo entry {name:?} is not a publisher channel")]
pub struct ReplyChannelTypeError {
    /// The name whose registered entry had the wrong kind.
    pub name: String,
}

#[derive(Serialize)]
struct ErrorResult {
    #[serde(rename = "errorString")]
    error_string: String,
}

impl ReplyToHandler {
    /// Wraps `inner`, resolving reply channels from `channels`.
    pub fn new(inner: Arc<dyn Handler>, channels: Arc<Registry<Arc<dyn PublisherChannel>>>) -> Self {
        Self { inner, channels }
    }
}

#[async_trait]
impl Handler for ReplyToHandler {
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        if !message.reply_required() {
            return self.inner.handle(message).await;
        }

        let reply_to = message.headers().get("replyTo").to_string();
        let correlation_id = message.correlation_id().to_string();

        let result = self.inner.handle(message).await;

        if reply_to.is_empty() {
            return Err(PipelineError::from_source(
                "cannot reply: no replyTo channel",
                NoReplyChannelError,
            ));
        }

        let channel = match self.channels.get(&reply_to) {
            Ok(channel) => channel,
            Err(_) => {
                return Err(PipelineError::from_source(
                    format!("cannot reply: {reply_to:?} is not a publisher channel"),
                    ReplyChannelTypeError { name: reply_to },
                ))
            }
        };

        let reply_payload = match &result {
            Ok(produced) => produced.payload().to_vec(),
            Err(error) => serde_json::to_vec(&ErrorResult {
                error_string: error.message().to_string(),
            })
            .unwrap_or_default(),
        };

        let reply = MessageBuilder::new(MessageType::Document)
            .payload(reply_payload)
            .correlation_id(correlation_id)
            .build()
            .expect("reply envelope is always well-formed");

        if channel.send(&reply).await.is_err() {
            // The reply failed to go out, but the original processing
            // outcome is still what the caller needs to see.
        }

        result
    }
}
