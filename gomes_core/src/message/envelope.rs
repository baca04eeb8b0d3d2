use crate::broker::PublisherChannel;
use crate::message::header::HeaderMap;
use crate::message::message_type::MessageType;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries cancellation and an optional processing deadline alongside a
/// [`Message`] as it flows through the pipeline.
///
/// Rather than a global, process-wide cancellation source, each message
/// carries its own, derived from the worker's per-message operation
/// context.
#[derive(Debug, Clone)]
pub struct MessageContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl MessageContext {
    /// Creates a context with no deadline, linked to `cancellation`.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    /// Creates a context with no cancellation source and no deadline. Useful
    /// for constructing messages outside of the consumer's worker loop
    /// (e.g. from an outbound bus façade).
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Attaches a processing deadline to this context.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The underlying cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The processing deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Waits until this context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Reports whether this context has already been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// An immutable message envelope flowing through the pipeline.
///
/// Built exclusively through [`MessageBuilder`](super::MessageBuilder).
/// After construction, only [`context`](Message::context),
/// [`raw_message`](Message::raw_message), and
/// [`reply_channel`](Message::reply_channel) may be late-bound, as the
/// consumer and gateway hand the message down through the pipeline.
#[derive(Clone)]
pub struct Message {
    payload: Vec<u8>,
    headers: HeaderMap,
    message_type: MessageType,
    context: MessageContext,
    raw_message: Option<Arc<dyn std::any::Any + Send + Sync>>,
    reply_channel: Option<Weak<dyn PublisherChannel>>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("message_id", &self.message_id())
            .field("message_type", &self.message_type)
            .field("headers", &self.headers)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Message {
    pub(crate) fn new(
        payload: Vec<u8>,
        headers: HeaderMap,
        message_type: MessageType,
        context: MessageContext,
    ) -> Self {
        Self {
            payload,
            headers,
            message_type,
            context,
            raw_message: None,
            reply_channel: None,
        }
    }

    /// The opaque business payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The full header contract.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The message's CQRS category.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Whether this message expects exactly one reply.
    pub fn reply_required(&self) -> bool {
        self.message_type.reply_required()
    }

    /// The globally unique identifier assigned at build time.
    pub fn message_id(&self) -> &str {
        self.headers.get("messageId")
    }

    /// The correlation identifier, if any, used to link a reply back to its
    /// originating request.
    pub fn correlation_id(&self) -> &str {
        self.headers.get("correlationId")
    }

    /// The cancellation/deadline context flowing with this message.
    pub fn context(&self) -> &MessageContext {
        &self.context
    }

    /// Late-binds a new context (e.g. a per-attempt operation context
    /// derived for a processing timeout).
    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = context;
        self
    }

    /// The transport-native raw message, kept around for acknowledgment.
    pub fn raw_message(&self) -> Option<&Arc<dyn std::any::Any + Send + Sync>> {
        self.raw_message.as_ref()
    }

    /// Late-binds the transport-native raw message.
    pub fn with_raw_message(mut self, raw_message: Arc<dyn std::any::Any + Send + Sync>) -> Self {
        self.raw_message = Some(raw_message);
        self
    }

    /// The in-process reply sink, if one is linked. A message with no reply
    /// channel must never block a producer waiting for a reply.
    pub fn reply_channel(&self) -> Option<Arc<dyn PublisherChannel>> {
        self.reply_channel.as_ref().and_then(Weak::upgrade)
    }

    /// Late-binds a weak reference to an in-process reply sink.
    pub fn with_reply_channel(mut self, reply_channel: &Arc<dyn PublisherChannel>) -> Self {
        self.reply_channel = Some(Arc::downgrade(reply_channel));
        self
    }

    /// Returns a new message with an overwritten payload, preserving headers
    /// and context. Used when building a reply or dead-letter record derived
    /// from an existing message.
    #[allow(dead_code)]
    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}
