//! Routes outbound messages to the publisher channel named by their headers.

use crate::broker::PublisherChannel;
use crate::message::Message;
use crate::registry::Registry;
use std::sync::Arc;
use thiserror::Error;

/// Forwards a message to the publisher channel named by its headers.
///
/// `channelName` takes precedence over `route` when both are present. This
/// is the innermost handler in every gateway-composed chain.
pub struct Router {
    channels: Arc<Registry<Arc<dyn PublisherChannel>>>,
}

/// Raised when neither `channelName` nor `route` resolves to a registered
/// publisher channel.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no publisher channel registered for route {route:?}")]
pub struct UnroutableError {
    /// The route (or channel name) that could not be resolved.
    pub route: String,
}

/// Raised when the resolved entry exists but is not a publisher channel.
#[derive(Debug, Error)]
#[error("entry {name:?} is not a publisher channel")]
pub struct ChannelTypeError {
    /// The name whose registered entry had the wrong kind.
    pub name: String,
}

impl Router {
    /// Builds a router backed by the given publisher-channel registry.
    pub fn new(channels: Arc<Registry<Arc<dyn PublisherChannel>>>) -> Self {
        Self { channels }
    }

    /// Selects a destination channel from `message`'s headers and forwards
    /// it. Returns the original message unchanged so after-interceptors can
    /// still observe it.
    pub async fn route(&self, message: Message) -> Result<Message, UnroutableError> {
        let channel_name = message.headers().get("channelName");
        let route = message.headers().get("route");

        let selected = if !channel_name.is_empty() {
            channel_name
        } else {
            route
        };

        if selected.is_empty() {
            return Err(UnroutableError {
                route: String::new(),
            });
        }

        let channel = self.channels.get(selected).map_err(|_| UnroutableError {
            route: selected.to_string(),
        })?;

        channel
            .send(&message)
            .await
            .map_err(|_| UnroutableError {
                route: selected.to_string(),
            })?;

        Ok(message)
    }
}
