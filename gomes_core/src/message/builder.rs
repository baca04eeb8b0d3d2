use crate::message::envelope::{Message, MessageContext};
use crate::message::header::{HeaderMap, HeaderParseError, RestrictedHeaderError};
use crate::message::message_type::MessageType;
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_ORIGIN: &str = "Gomes";
const DEFAULT_VERSION: &str = "1.0";
const TIMESTAMP_FORMAT_EXAMPLE: &str = "YYYY-MM-DD HH:MM:SS";

/// Builds a [`Message`] from scratch, from an existing message, or from a
/// flat wire-level header mapping.
///
/// `messageId`, `timestamp`, `origin`, and `version` are assigned defaults at
/// [`build`](MessageBuilder::build) time unless explicitly provided, and can
/// never be overwritten afterward.
pub struct MessageBuilder {
    payload: Vec<u8>,
    message_type: MessageType,
    message_id: Option<String>,
    timestamp: Option<String>,
    origin: Option<String>,
    version: Option<String>,
    headers: HeaderMap,
}

impl MessageBuilder {
    /// Starts a fresh builder for a message of the given type.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            payload: Vec::new(),
            message_type,
            message_id: None,
            timestamp: None,
            origin: None,
            version: None,
            headers: HeaderMap::new(),
        }
    }

    /// Starts a builder pre-populated from an existing message (e.g. to
    /// build a reply or a dead-letter record that carries the same
    /// correlation id).
    pub fn from_message(source: &Message, message_type: MessageType) -> Self {
        let mut builder = Self::new(message_type);

        let correlation_id = source.correlation_id();
        if !correlation_id.is_empty() {
            builder = builder.header("correlationId", correlation_id).unwrap();
        }

        builder
    }

    /// Parses a flat string header mapping received from a transport
    /// boundary. The `messageType` header determines the built message's
    /// type, falling back to [`MessageType::Document`] when absent or
    /// unrecognized. Recognized keys are routed to their typed fields; empty
    /// values are skipped; unrecognized keys become custom headers.
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self, HeaderParseError> {
        let message_type = headers
            .get("messageType")
            .map(|value| MessageType::from(value.as_str()))
            .unwrap_or(MessageType::Document);
        let mut builder = Self::new(message_type);

        for (key, value) in headers {
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "messageId" => builder.message_id = Some(value.clone()),
                "timestamp" => {
                    validate_timestamp(value).ok_or_else(|| HeaderParseError {
                        key: key.clone(),
                        value: value.clone(),
                    })?;
                    builder.timestamp = Some(value.clone());
                }
                "origin" => builder.origin = Some(value.clone()),
                "version" => builder.version = Some(value.clone()),
                "messageType" => {
                    // Already consumed above to determine the builder's
                    // message type.
                }
                _ => {
                    builder
                        .headers
                        .try_set(key.clone(), value.clone())
                        .map_err(|RestrictedHeaderError { key }| HeaderParseError {
                            key,
                            value: value.clone(),
                        })?;
                }
            }
        }

        Ok(builder)
    }

    /// Sets the payload.
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets a non-restricted header, rejecting the four restricted keys.
    pub fn header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, RestrictedHeaderError> {
        self.headers.try_set(key, value)?;
        Ok(self)
    }

    /// Sets the `route` header, used by the recipient-list router.
    pub fn route(self, route: impl Into<String>) -> Self {
        self.header("route", route).expect("route is not restricted")
    }

    /// Sets the `channelName` header, which the router prefers over `route`.
    pub fn channel_name(self, channel_name: impl Into<String>) -> Self {
        self.header("channelName", channel_name)
            .expect("channelName is not restricted")
    }

    /// Sets the `replyTo` header consulted by the reply-to handler.
    pub fn reply_to(self, reply_to: impl Into<String>) -> Self {
        self.header("replyTo", reply_to)
            .expect("replyTo is not restricted")
    }

    /// Sets the `correlationId` header, copied onto replies and dead letters.
    pub fn correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.header("correlationId", correlation_id)
            .expect("correlationId is not restricted")
    }

    /// Overrides the `messageId`, otherwise freshly generated at build time.
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Builds the immutable [`Message`], assigning defaults for any
    /// unset restricted field.
    pub fn build(self) -> Result<Message, HeaderParseError> {
        let mut headers = self.headers;

        let message_id = self
            .message_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        headers.force_set("messageId", message_id);

        let timestamp = match self.timestamp {
            Some(timestamp) => timestamp,
            None => current_timestamp(),
        };
        headers.force_set("timestamp", timestamp);

        headers.force_set("origin", self.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string()));
        headers.force_set(
            "version",
            self.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        );
        headers.force_set("messageType", self.message_type.as_wire_str());

        Ok(Message::new(
            self.payload,
            headers,
            self.message_type,
            MessageContext::detached(),
        ))
    }
}

fn validate_timestamp(value: &str) -> Option<()> {
    // "YYYY-MM-DD HH:MM:SS", ASCII-digit positions checked structurally
    // rather than via a full calendar parse.
    let bytes = value.as_bytes();
    if bytes.len() != TIMESTAMP_FORMAT_EXAMPLE.len() {
        return None;
    }

    let digit_positions = [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18];
    let separator_positions = [(4, b'-'), (7, b'-'), (10, b' '), (13, b':'), (16, b':')];

    for &pos in &digit_positions {
        if !bytes.get(pos)?.is_ascii_digit() {
            return None;
        }
    }
    for (pos, expected) in separator_positions {
        if bytes.get(pos)? != &expected {
            return None;
        }
    }

    Some(())
}

fn current_timestamp() -> String {
    humantime::format_rfc3339_seconds(std::time::SystemTime::now())
        .to_string()
        .replace('T', " ")
        .trim_end_matches('Z')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_assigns_defaults() {
        let message = MessageBuilder::new(MessageType::Command).build().unwrap();

        assert_ne!(message.message_id(), "");
        assert_eq!(message.headers().get("origin"), "Gomes");
        assert_eq!(message.headers().get("version"), "1.0");
        assert_eq!(message.headers().get("messageType"), "Command");
    }

    #[test]
    fn explicit_message_id_is_preserved() {
        let message = MessageBuilder::new(MessageType::Event)
            .with_message_id("fixed-id")
            .build()
            .unwrap();

        assert_eq!(message.message_id(), "fixed-id");
    }

    #[test]
    fn from_headers_routes_known_keys() {
        let mut raw = HashMap::new();
        raw.insert("messageId".to_string(), "abc-123".to_string());
        raw.insert("origin".to_string(), "UpstreamService".to_string());
        raw.insert("route".to_string(), "createUser".to_string());
        raw.insert("custom".to_string(), "value".to_string());

        let message = MessageBuilder::from_headers(&raw).unwrap().build().unwrap();

        assert_eq!(message.message_id(), "abc-123");
        assert_eq!(message.headers().get("origin"), "UpstreamService");
        assert_eq!(message.headers().get("route"), "createUser");
        assert_eq!(message.headers().get("custom"), "value");
    }

    #[test]
    fn from_headers_skips_empty_values() {
        let mut raw = HashMap::new();
        raw.insert("origin".to_string(), "".to_string());

        let message = MessageBuilder::from_headers(&raw).unwrap().build().unwrap();

        assert_eq!(message.headers().get("origin"), "Gomes");
    }

    #[test]
    fn from_headers_rejects_malformed_timestamp() {
        let mut raw = HashMap::new();
        raw.insert("timestamp".to_string(), "not-a-timestamp".to_string());

        let result = MessageBuilder::from_headers(&raw);

        assert!(result.is_err());
    }

    #[test]
    fn from_headers_accepts_well_formed_timestamp() {
        let mut raw = HashMap::new();
        raw.insert("timestamp".to_string(), "2026-08-01 12:30:00".to_string());

        let message = MessageBuilder::from_headers(&raw).unwrap().build().unwrap();

        assert_eq!(message.headers().get("timestamp"), "2026-08-01 12:30:00");
    }

    #[test]
    fn from_headers_derives_message_type_from_wire_header() {
        let mut raw = HashMap::new();
        raw.insert("messageType".to_string(), "Query".to_string());

        let message = MessageBuilder::from_headers(&raw).unwrap().build().unwrap();

        assert_eq!(message.message_type(), MessageType::Query);
    }

    #[test]
    fn from_headers_defaults_to_document_when_message_type_is_absent() {
        let raw = HashMap::new();

        let message = MessageBuilder::from_headers(&raw).unwrap().build().unwrap();

        assert_eq!(message.message_type(), MessageType::Document);
    }

    #[test]
    fn route_header_round_trips() {
        let message = MessageBuilder::new(MessageType::Command)
            .route("createUser")
            .build()
            .unwrap();

        assert_eq!(message.headers().get("route"), "createUser");
    }
}
