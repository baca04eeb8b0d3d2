//! Synchronization primitives used by the inbound processing engine.
//!
//! These are small, generic building blocks with no messaging-specific
//! knowledge baked in; the gateway and consumer crate compose them into
//! the stop/cancellation and reply-awaiting mechanisms the middleware
//! needs.
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

mod stop_signal;
pub use self::stop_signal::{StopSignal, StopWatcher};

mod reply_conduit;
pub use self::reply_conduit::{ReplyAwaiter, ReplyConduit};
