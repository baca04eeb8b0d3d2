//! Contracts a broker adapter must implement to plug into the middleware.
//! No concrete Kafka/RabbitMQ wiring lives here — only the traits the
//! gateway, router, and consumer depend on.

use crate::message::Message;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;

/// A named connection to a broker, opened during [`Start`](crate::bootstrap::Middleware::start)
/// and closed during [`Shutdown`](crate::bootstrap::Middleware::shutdown).
#[async_trait]
pub trait Connection: Send + Sync {
    /// The name this connection was registered under.
    fn reference_name(&self) -> &str;

    /// Opens the connection.
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Closes the connection.
    async fn disconnect(&self) -> Result<(), ConnectionError>;
}

/// A named outbound channel. Implementations must be safe for concurrent
/// `send` calls from any number of caller tasks.
#[async_trait]
pub trait PublisherChannel: Send + Sync {
    /// The name this channel was registered under.
    fn name(&self) -> &str;

    /// Publishes `message` to the broker.
    async fn send(&self, message: &Message) -> Result<(), PublishError>;

    /// Returns this channel as a [`Closable`], if it implements the
    /// capability. Consulted during [`Shutdown`](crate::bootstrap::Middleware::shutdown).
    fn as_closable(&self) -> Option<&dyn Closable> {
        None
    }
}

/// Optional capability: a channel (publisher or otherwise) that can be
/// explicitly closed. Queried rather than assumed.
pub trait Closable {
    /// Closes the underlying resource.
    fn close(&self) -> Result<(), CloseError>;
}

/// Optional capability: an inbound adapter whose delivered messages can be
/// committed back to the broker.
#[async_trait]
pub trait ChannelMessageAcknowledgment: Send + Sync {
    /// Commits (acknowledges) a previously received raw message.
    async fn commit_message(&self, raw_message: &(dyn Any + Sync)) -> Result<(), CommitError>;
}

/// Declarations an inbound adapter carries about how its messages should be
/// processed, consulted when the [`Gateway`](crate::pipeline::Gateway) for
/// that channel is constructed.
pub struct ChannelDeclarations {
    /// Ordered, fixed millisecond delays between retry attempts. Empty means
    /// no retry.
    pub retry_delays_ms: Vec<u64>,
    /// Name of the publisher channel dead letters are routed to, if any.
    pub dead_letter_channel_name: Option<String>,
    /// Interceptors run before the retry/dead-letter/acknowledge chain.
    pub before_interceptors: Vec<String>,
    /// Interceptors run after the chain, regardless of outcome.
    pub after_interceptors: Vec<String>,
    /// Whether a reply should be sent using the message's `replyTo` header.
    pub send_reply_using_reply_to: bool,
}

impl Default for ChannelDeclarations {
    fn default() -> Self {
        Self {
            retry_delays_ms: Vec::new(),
            dead_letter_channel_name: None,
            before_interceptors: Vec::new(),
            after_interceptors: Vec::new(),
            send_reply_using_reply_to: false,
        }
    }
}

/// A named inbound adapter the event-driven consumer pulls messages from.
#[async_trait]
pub trait InboundAdapter: Send + Sync {
    /// The name this adapter was registered under.
    fn reference_name(&self) -> &str;

    /// Receives the next message, blocking until one arrives, the adapter
    /// closes, or `ctx` is cancelled.
    async fn receive(&self) -> Result<Message, ReceiveError>;

    /// Closes the adapter, unblocking any in-flight [`receive`](Self::receive).
    async fn close(&self) -> Result<(), CloseError>;

    /// The declarations this adapter carries for gateway construction.
    fn declarations(&self) -> &ChannelDeclarations;

    /// Returns this adapter as an acknowledger, if it implements the
    /// capability.
    fn as_acknowledger(&self) -> Option<&dyn ChannelMessageAcknowledgment> {
        None
    }
}

/// A transient failure opening or closing a [`Connection`].
#[derive(Debug, thiserror::Error)]
#[error("connection error: {0}")]
pub struct ConnectionError(pub String);

/// A failure publishing a message.
#[derive(Debug, thiserror::Error)]
#[error("publish error: {0}")]
pub struct PublishError(pub String);

/// A failure closing a channel or connection.
#[derive(Debug, thiserror::Error)]
#[error("close error: {0}")]
pub struct CloseError(pub String);

/// A failure committing (acknowledging) a message. Always logged, never
/// propagated.
#[derive(Debug, thiserror::Error)]
#[error("commit error: {0}")]
pub struct CommitError(pub String);

/// A failure receiving the next inbound message.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    /// The adapter (or the caller's context) was cancelled.
    #[error("receive cancelled")]
    Cancelled,
    /// A transport-level failure occurred.
    #[error("receive error: {0}")]
    Transport(String),
}

impl fmt::Debug for dyn PublisherChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherChannel").field("name", &self.name()).finish()
    }
}
