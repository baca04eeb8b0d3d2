use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// The error type every [`Handler`](super::Handler) in the chain returns.
///
/// Wrapping every inner error in one type (rather than threading a generic
/// error parameter through the whole chain) is what lets the retry,
/// dead-letter, and reply-to handlers treat "the inner handler failed"
/// uniformly while still preserving the original cause for logging and for
/// the dead-letter record's `reasonError` field.
#[derive(Debug, Clone)]
pub struct PipelineError {
    message: Arc<str>,
    cancelled: bool,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl PipelineError {
    /// Builds a plain handler-level failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Arc::from(message.into()),
            cancelled: false,
            source: None,
        }
    }

    /// Builds a failure wrapping an underlying error.
    pub fn from_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: Arc::from(message.into()),
            cancelled: false,
            source: Some(Arc::new(source)),
        }
    }

    /// Builds the special case raised when a context is cancelled mid-retry
    /// sleep. Cancellation errors are never dead-lettered or retried
    /// further.
    pub fn cancelled(inner: PipelineError) -> Self {
        Self {
            message: Arc::from(format!("processing cancelled: {}", inner.message)),
            cancelled: true,
            source: inner.source,
        }
    }

    /// Reports whether this failure originates from context cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The human-readable failure message, used in logs and in dead-letter
    /// records.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for PipelineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}
