//! Declarative sugar over the programmatic bootstrap surface. An embedding
//! application can deserialize a [`MiddlewareConfig`]
//! from a file and use its descriptors to drive [`Middleware::add_channel_connection`](super::Middleware::add_channel_connection)
//! and friends; trait-object implementations (the actual `Connection`,
//! `PublisherChannel`, `InboundAdapter` values) are still supplied by the
//! application, since they carry broker-specific wiring this crate knows
//! nothing about.

use crate::broker::ChannelDeclarations;
use crate::consumer::ConsumerConfig;
use serde::Deserialize;
use std::collections::HashMap;

/// The full declarative bootstrap description.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Named connection descriptors.
    pub connections: HashMap<String, ConnectionDescriptor>,
    /// Named publisher-channel descriptors.
    pub publisher_channels: HashMap<String, PublisherChannelDescriptor>,
    /// Named consumer-channel descriptors.
    pub consumer_channels: HashMap<String, ConsumerChannelDescriptor>,
}

/// Placeholder for connection-specific configuration. The core has no
/// opinion on transport details; an application extends this with its own
/// config type if it needs one.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionDescriptor {}

/// Placeholder for publisher-channel-specific configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PublisherChannelDescriptor {}

/// The declarations and tunables a consumer channel carries, mirroring
/// [`ChannelDeclarations`] and [`ConsumerConfig`] field for field.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConsumerChannelDescriptor {
    /// Ordered, fixed millisecond delays between retry attempts.
    pub retry_delays_ms: Vec<u64>,
    /// Name of the publisher channel dead letters are routed to, if any.
    pub dead_letter_channel_name: Option<String>,
    /// Interceptors run before the retry/dead-letter/acknowledge chain.
    pub before_interceptors: Vec<String>,
    /// Interceptors run after the chain, regardless of outcome.
    pub after_interceptors: Vec<String>,
    /// Whether a reply should be sent using the message's `replyTo` header.
    pub send_reply_using_reply_to: bool,
    /// Number of concurrent worker tasks.
    pub amount_of_processors: usize,
    /// Per-message processing deadline, in milliseconds.
    pub processing_timeout_milliseconds: u64,
    /// Whether a single processing error tears the consumer down.
    pub stop_on_error: bool,
}

impl ConsumerChannelDescriptor {
    /// Extracts the [`ChannelDeclarations`] half of this descriptor.
    pub fn declarations(&self) -> ChannelDeclarations {
        ChannelDeclarations {
            retry_delays_ms: self.retry_delays_ms.clone(),
            dead_letter_channel_name: self.dead_letter_channel_name.clone(),
            before_interceptors: self.before_interceptors.clone(),
            after_interceptors: self.after_interceptors.clone(),
            send_reply_using_reply_to: self.send_reply_using_reply_to,
        }
    }

    /// Extracts the [`ConsumerConfig`] half of this descriptor, clamping
    /// out-of-range values the same way [`ConsumerConfig::new`] does.
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::new(
            self.amount_of_processors,
            self.processing_timeout_milliseconds,
            self.stop_on_error,
        )
    }
}
