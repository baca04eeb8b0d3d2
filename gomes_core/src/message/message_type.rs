use std::fmt;

/// The CQRS category a [`Message`](super::Message) belongs to.
///
/// Commands and queries expect a reply; events and documents never do. A
/// message's type is immutable once built and drives both the reply-to
/// handler and the wire-level `messageType` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Requests a state change; expects exactly one reply.
    Command,
    /// Requests data without side effects; expects exactly one reply.
    Query,
    /// Announces a fact that already happened; never replied to.
    Event,
    /// A plain carrier message, e.g. a reply or a dead-letter record.
    Document,
}

impl MessageType {
    /// Reports whether a message of this type requires a reply.
    pub fn reply_required(self) -> bool {
        matches!(self, MessageType::Command | MessageType::Query)
    }

    /// The canonical wire representation used in the `messageType` header.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            MessageType::Command => "Command",
            MessageType::Query => "Query",
            MessageType::Event => "Event",
            MessageType::Document => "Document",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl From<&str> for MessageType {
    /// Parses the wire representation of a message type. Any value other than
    /// the three recognized literals defaults to [`MessageType::Document`].
    fn from(value: &str) -> Self {
        match value {
            "Command" => MessageType::Command,
            "Query" => MessageType::Query,
            "Event" => MessageType::Event,
            _ => MessageType::Document,
        }
    }
}
