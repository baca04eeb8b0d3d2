//! In-process CQRS-style messaging middleware: commands, queries, and
//! events flow through a composed pipeline (retry, dead-letter,
//! acknowledge, reply-to, interceptors) onto pluggable broker transports.
//!
//! An embedding application implements [`broker::Connection`],
//! [`broker::PublisherChannel`], and [`broker::InboundAdapter`] against its
//! transport of choice, registers them on a [`bootstrap::Middleware`], calls
//! [`bootstrap::Middleware::start`], then talks to the system through
//! [`bootstrap::CommandBus`], [`bootstrap::QueryBus`], and
//! [`bootstrap::EventBus`] handles.
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

pub mod bootstrap;
pub mod broker;
pub mod consumer;
pub mod message;
pub mod pipeline;
pub mod registry;
pub mod router;

pub use self::bootstrap::{BusError, CommandBus, EventBus, Middleware, QueryBus};
pub use self::consumer::{ConsumerConfig, ConsumerError, ConsumerState, EventDrivenConsumer};
pub use self::message::{Message, MessageBuilder, MessageContext, MessageType};
pub use self::pipeline::{Gateway, PipelineError};
pub use self::registry::Registry;
pub use self::router::Router;
