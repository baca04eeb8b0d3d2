//! `CommandBus`/`QueryBus`/`EventBus`: thin, cheaply-cloneable handles over a
//! named `PublisherChannel`.

use crate::broker::{PublisherChannel, PublishError};
use crate::message::{HeaderParseError, Message, MessageBuilder, MessageType};
use async_trait::async_trait;
use gomes_sync::ReplyConduit;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure building or publishing a command/query/event through a bus
/// façade.
#[derive(Debug, Error)]
pub enum BusError {
    /// The outbound message could not be assembled.
    #[error(transparent)]
    Build(#[from] HeaderParseError),
    /// The target publisher channel rejected the message.
    #[error(transparent)]
    Publish(#[from] PublishError),
    /// A reply was required but none arrived before the caller's timeout.
    #[error("no reply arrived before the timeout")]
    NoReply,
}

/// The publisher-channel capability backing a command/query's synchronous
/// round trip: the `internalReplyChannel` a request message carries.
///
/// The reply-to handler that eventually processes the request calls
/// [`send`](PublisherChannel::send) on this, which hands the reply straight
/// to whichever [`ReplyAwaiter`](gomes_sync::ReplyAwaiter) is currently
/// blocked in [`CommandBus::request`]/[`QueryBus::request`].
struct InProcessReplySink {
    conduit: ReplyConduit<Message>,
}

#[async_trait]
impl PublisherChannel for InProcessReplySink {
    fn name(&self) -> &str {
        "internalReplyChannel"
    }

    async fn send(&self, message: &Message) -> Result<(), PublishError> {
        self.conduit.fulfill(message.clone()).await;
        Ok(())
    }
}

async fn request(
    channel: &Arc<dyn PublisherChannel>,
    message_type: MessageType,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<Message, BusError> {
    let conduit = ReplyConduit::new();
    let awaiter = conduit.awaiter();
    let sink: Arc<dyn PublisherChannel> = Arc::new(InProcessReplySink { conduit });

    let message = MessageBuilder::new(message_type)
        .payload(payload)
        .build()?
        .with_reply_channel(&sink);

    channel.send(&message).await?;

    awaiter.request_with_timeout(timeout).await.ok_or(BusError::NoReply)
}

async fn publish(channel: &Arc<dyn PublisherChannel>, message_type: MessageType, payload: Vec<u8>) -> Result<(), BusError> {
    let message = MessageBuilder::new(message_type).payload(payload).build()?;
    channel.send(&message).await?;
    Ok(())
}

/// Sends commands to a named publisher channel, optionally awaiting a
/// synchronous reply.
#[derive(Clone)]
pub struct CommandBus {
    channel: Arc<dyn PublisherChannel>,
}

impl CommandBus {
    pub(crate) fn new(channel: Arc<dyn PublisherChannel>) -> Self {
        Self { channel }
    }

    /// Publishes a command without waiting for a reply.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), BusError> {
        publish(&self.channel, MessageType::Command, payload).await
    }

    /// Publishes a command and awaits the reply on its `internalReplyChannel`,
    /// giving up after `timeout`.
    pub async fn request(&self, payload: Vec<u8>, timeout: Duration) -> Result<Message, BusError> {
        request(&self.channel, MessageType::Command, payload, timeout).await
    }
}

/// Sends queries to a named publisher channel, always awaiting a reply.
#[derive(Clone)]
pub struct QueryBus {
    channel: Arc<dyn PublisherChannel>,
}

impl QueryBus {
    pub(crate) fn new(channel: Arc<dyn PublisherChannel>) -> Self {
        Self { channel }
    }

    /// Publishes a query and awaits the reply, giving up after `timeout`.
    pub async fn request(&self, payload: Vec<u8>, timeout: Duration) -> Result<Message, BusError> {
        request(&self.channel, MessageType::Query, payload, timeout).await
    }
}

/// Publishes fire-and-forget events to a named publisher channel. Never
/// waits for a reply: `replyRequired` is always `false` for
/// [`MessageType::Event`].
#[derive(Clone)]
pub struct EventBus {
    channel: Arc<dyn PublisherChannel>,
}

impl EventBus {
    pub(crate) fn new(channel: Arc<dyn PublisherChannel>) -> Self {
        Self { channel }
    }

    /// Publishes an event.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), BusError> {
        publish(&self.channel, MessageType::Event, payload).await
    }
}
