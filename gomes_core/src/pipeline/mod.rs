//! The ordered handler chain applied to every inbound message.

mod error;
pub use self::error::PipelineError;

mod handler;
pub use self::handler::{FnHandler, Handler};

mod retry;
pub use self::retry::RetryHandler;

mod dead_letter;
pub use self::dead_letter::DeadLetterHandler;

mod acknowledge;
pub use self::acknowledge::AcknowledgeHandler;

mod reply_to;
pub use self::reply_to::{NoReplyChannelError, ReplyChannelTypeError, ReplyToHandler};

mod interceptor;
pub use self::interceptor::{AfterInterceptors, BeforeInterceptors};

mod gateway;
pub use self::gateway::Gateway;
