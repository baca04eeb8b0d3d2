//! `Middleware`: the bootstrap surface an embedding application registers
//! connections, channels, and handlers against, then `start`s and
//! eventually `shutdown`s.

mod bus;
mod config;

pub use self::bus::{BusError, CommandBus, EventBus, QueryBus};
pub use self::config::MiddlewareConfig;

use crate::broker::{ChannelMessageAcknowledgment, CommitError, Connection, ConnectionError, InboundAdapter, PublisherChannel};
use crate::consumer::{ConsumerConfig, EventDrivenConsumer};
use crate::pipeline::Handler;
use crate::registry::{DuplicateError, NotFoundError, Registry};
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failures raised by [`Middleware::start`] or the `Add*` registration
/// methods.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// `start` was called more than once.
    #[error("middleware has already been started")]
    AlreadyStarted,
    /// A registration used a name already taken.
    #[error(transparent)]
    Duplicate(#[from] DuplicateError),
    /// A dead-letter or interceptor name referenced during gateway
    /// construction was never registered.
    #[error("consumer {name:?} references an unregistered component: {source}")]
    UnresolvedDependency {
        /// The consumer channel whose declarations named the missing entry.
        name: String,
        /// The lookup failure.
        source: NotFoundError,
    },
    /// A connection failed to open during `start`.
    #[error("failed to open connection {name:?}: {source}")]
    Connection {
        /// The connection that failed to open.
        name: String,
        /// The underlying failure.
        source: ConnectionError,
    },
}

#[derive(Clone)]
struct ConsumerRegistration {
    adapter: Arc<dyn InboundAdapter>,
    config: ConsumerConfig,
}

/// An adapter's own [`ChannelMessageAcknowledgment`] capability, re-exposed
/// as an independently owned `Arc`. [`InboundAdapter::as_acknowledger`]
/// hands back a borrowed reference (it cannot hand back an owned `Arc` to
/// itself), so the gateway wraps the adapter `Arc` instead of reaching
/// through it.
struct AdapterAcknowledger {
    adapter: Arc<dyn InboundAdapter>,
}

#[async_trait]
impl ChannelMessageAcknowledgment for AdapterAcknowledger {
    async fn commit_message(&self, raw_message: &(dyn Any + Sync)) -> Result<(), CommitError> {
        match self.adapter.as_acknowledger() {
            Some(acknowledger) => acknowledger.commit_message(raw_message).await,
            None => Ok(()),
        }
    }
}

/// One of the endpoint kinds resolvable by name from the active-endpoints
/// registry.
#[derive(Clone)]
enum ActiveEndpoint {
    Command(CommandBus),
    Query(QueryBus),
    Event(EventBus),
}

/// The bootstrap/lifecycle facade. Registrations (`add_*`) are only valid
/// before [`start`](Self::start); afterwards the middleware is immutable
/// except for the additive, idempotent active-endpoints registry.
pub struct Middleware {
    connections: Registry<Arc<dyn Connection>>,
    publisher_channels: Arc<Registry<Arc<dyn PublisherChannel>>>,
    consumer_adapters: Registry<ConsumerRegistration>,
    action_handlers: Registry<Arc<dyn Handler>>,
    consumers: Registry<Arc<EventDrivenConsumer>>,
    active_endpoints: Registry<ActiveEndpoint>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl Default for Middleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware {
    /// Creates an empty middleware. Nothing is live until [`start`](Self::start)
    /// runs.
    pub fn new() -> Self {
        Self {
            connections: Registry::new(),
            publisher_channels: Arc::new(Registry::new()),
            consumer_adapters: Registry::new(),
            action_handlers: Registry::new(),
            consumers: Registry::new(),
            active_endpoints: Registry::new(),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Registers a broker connection, opened during `start`.
    pub fn add_channel_connection(&self, name: impl Into<String>, connection: Arc<dyn Connection>) -> Result<(), BootstrapError> {
        self.require_not_started()?;
        self.connections.set(name, connection)?;
        Ok(())
    }

    /// Registers an outbound publisher channel.
    pub fn add_publisher_channel(&self, name: impl Into<String>, channel: Arc<dyn PublisherChannel>) -> Result<(), BootstrapError> {
        self.require_not_started()?;
        self.publisher_channels.set(name, channel)?;
        Ok(())
    }

    /// Registers an inbound consumer channel and the tunables its consumer
    /// runs with.
    pub fn add_consumer_channel(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn InboundAdapter>,
        config: ConsumerConfig,
    ) -> Result<(), BootstrapError> {
        self.require_not_started()?;
        self.consumer_adapters.set(name, ConsumerRegistration { adapter, config })?;
        Ok(())
    }

    /// Registers an action handler (interceptor) resolvable by name from a
    /// channel's `beforeInterceptors`/`afterInterceptors` declarations.
    pub fn add_action_handler(&self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Result<(), BootstrapError> {
        self.require_not_started()?;
        self.action_handlers.set(name, handler)?;
        Ok(())
    }

    fn require_not_started(&self) -> Result<(), BootstrapError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(BootstrapError::AlreadyStarted);
        }
        Ok(())
    }

    /// Runs the fixed-order, single-shot bootstrap sequence.
    /// Re-entry is rejected with [`BootstrapError::AlreadyStarted`].
    pub async fn start(&self) -> Result<(), BootstrapError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BootstrapError::AlreadyStarted);
        }

        // 1. Default command/query dispatchers live in the active-endpoints
        //    registry, inserted lazily on first `*_bus_by_channel` call;
        //    there is nothing to seed eagerly.
        info!("active-endpoints registry ready");

        // 2. Action handlers are already materialized at registration time;
        //    this step only confirms what is available to interceptors.
        for name in self.action_handlers.get_all().keys() {
            info!(handler = %name, "action handler ready");
        }

        // 3. Open connections.
        for (name, connection) in self.connections.get_all() {
            info!(connection = %name, "opening connection");
            connection
                .connect()
                .await
                .map_err(|source| BootstrapError::Connection { name: name.clone(), source })?;
        }

        // 4. Publisher channels are ready as soon as they're registered.
        for name in self.publisher_channels.get_all().keys() {
            info!(channel = %name, "publisher channel ready");
        }

        // 5. Build consumer channels: one gateway, one EventDrivenConsumer
        //    each.
        for (name, registration) in self.consumer_adapters.get_all() {
            info!(consumer = %name, "building consumer channel");

            let acknowledger: Option<Arc<dyn ChannelMessageAcknowledgment>> =
                if registration.adapter.as_acknowledger().is_some() {
                    Some(Arc::new(AdapterAcknowledger {
                        adapter: Arc::clone(&registration.adapter),
                    }))
                } else {
                    None
                };

            let gateway = crate::pipeline::Gateway::build(
                registration.adapter.declarations(),
                Arc::clone(&self.publisher_channels),
                acknowledger,
                &self.action_handlers,
            )
            .map_err(|source| BootstrapError::UnresolvedDependency { name: name.clone(), source })?;

            let consumer = EventDrivenConsumer::new(
                name.clone(),
                Arc::clone(&registration.adapter),
                Arc::new(gateway),
                registration.config.clone(),
            );

            self.consumers.set(name, consumer)?;
        }

        Ok(())
    }

    /// Tears down every registered component. Errors are logged, never
    /// propagated: shutdown always runs to completion. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        for (name, consumer) in self.consumers.get_all() {
            info!(consumer = %name, "stopping consumer");
            consumer.stop();
        }

        for (name, registration) in self.consumer_adapters.get_all() {
            if let Err(error) = registration.adapter.close().await {
                warn!(consumer = %name, %error, "failed to close inbound adapter during shutdown");
            }
        }

        for (name, channel) in self.publisher_channels.get_all() {
            if let Some(closable) = channel.as_closable() {
                if let Err(error) = closable.close() {
                    warn!(channel = %name, %error, "failed to close publisher channel during shutdown");
                }
            }
        }

        for (name, connection) in self.connections.get_all() {
            if let Err(error) = connection.disconnect().await {
                warn!(connection = %name, %error, "failed to disconnect during shutdown");
            }
        }

        info!("middleware shut down");
    }

    /// Looks up the named [`EventDrivenConsumer`] built during `start`.
    pub fn event_driven_consumer(&self, name: &str) -> Result<Arc<EventDrivenConsumer>, NotFoundError> {
        self.consumers.get(name)
    }

    /// Returns (lazily creating, idempotently) the [`CommandBus`] for the
    /// named publisher channel.
    pub fn command_bus_by_channel(&self, name: &str) -> Result<CommandBus, NotFoundError> {
        match self.endpoint(name, "command", |channel| ActiveEndpoint::Command(CommandBus::new(channel)))? {
            ActiveEndpoint::Command(bus) => Ok(bus),
            _ => unreachable!("endpoint key namespaced by kind"),
        }
    }

    /// Returns (lazily creating, idempotently) the [`QueryBus`] for the
    /// named publisher channel.
    pub fn query_bus_by_channel(&self, name: &str) -> Result<QueryBus, NotFoundError> {
        match self.endpoint(name, "query", |channel| ActiveEndpoint::Query(QueryBus::new(channel)))? {
            ActiveEndpoint::Query(bus) => Ok(bus),
            _ => unreachable!("endpoint key namespaced by kind"),
        }
    }

    /// Returns (lazily creating, idempotently) the [`EventBus`] for the
    /// named publisher channel.
    pub fn event_bus_by_channel(&self, name: &str) -> Result<EventBus, NotFoundError> {
        match self.endpoint(name, "event", |channel| ActiveEndpoint::Event(EventBus::new(channel)))? {
            ActiveEndpoint::Event(bus) => Ok(bus),
            _ => unreachable!("endpoint key namespaced by kind"),
        }
    }

    fn endpoint(
        &self,
        name: &str,
        kind: &str,
        build: impl FnOnce(Arc<dyn PublisherChannel>) -> ActiveEndpoint,
    ) -> Result<ActiveEndpoint, NotFoundError> {
        let key = format!("{name}:{kind}");

        if let Ok(endpoint) = self.active_endpoints.get(&key) {
            return Ok(endpoint);
        }

        let channel = self.publisher_channels.get(name)?;
        let endpoint = build(channel);
        // Another task may have raced us; either insertion is fine, so a
        // duplicate error here is not a failure.
        let _ = self.active_endpoints.set(&key, endpoint.clone());

        self.active_endpoints.get(&key)
    }
}
