use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// The terminal outcome of [`EventDrivenConsumer::run`](super::EventDrivenConsumer::run),
/// also recorded as the consumer's internal stop cause.
///
/// Distinguished from a single generic variant so callers can match on the
/// cause without string comparison: a caller-requested [`Stop`](super::EventDrivenConsumer::stop)
/// looks nothing like a message blowing its processing deadline.
#[derive(Debug, Clone)]
pub enum ConsumerError {
    /// `Stop()` was called with no cause, or the caller's context was
    /// cancelled.
    Cancelled,
    /// A single message exceeded `processingTimeoutMilliseconds` and
    /// `stopOnError` tore the consumer down as a result.
    DeadlineExceeded,
    /// A receive or handler failure (other than a deadline) tore the
    /// consumer down under `stopOnError`.
    Fatal(Arc<dyn StdError + Send + Sync>),
}

impl fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerError::Cancelled => f.write_str("consumer stopped"),
            ConsumerError::DeadlineExceeded => f.write_str("consumer stopped: processing deadline exceeded"),
            ConsumerError::Fatal(error) => write!(f, "consumer stopped: {error}"),
        }
    }
}

impl StdError for ConsumerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConsumerError::Cancelled | ConsumerError::DeadlineExceeded => None,
            ConsumerError::Fatal(error) => Some(error.as_ref()),
        }
    }
}
