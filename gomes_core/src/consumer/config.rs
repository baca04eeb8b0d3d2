use serde::Deserialize;

pub(crate) const DEFAULT_PROCESSING_TIMEOUT_MS: u64 = 100_000;

/// Tunables for an [`EventDrivenConsumer`](super::EventDrivenConsumer).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Number of concurrent worker tasks. Clamped to at least 1.
    pub amount_of_processors: usize,
    /// Per-message processing deadline, in milliseconds. Values `<= 0` fall
    /// back to the default.
    pub processing_timeout_milliseconds: u64,
    /// Whether a single processing error tears the consumer down.
    pub stop_on_error: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            amount_of_processors: 1,
            processing_timeout_milliseconds: DEFAULT_PROCESSING_TIMEOUT_MS,
            stop_on_error: true,
        }
    }
}

impl ConsumerConfig {
    /// Builds a config, clamping out-of-range values to their documented
    /// defaults.
    pub fn new(amount_of_processors: usize, processing_timeout_milliseconds: u64, stop_on_error: bool) -> Self {
        Self {
            amount_of_processors: amount_of_processors.max(1),
            processing_timeout_milliseconds: if processing_timeout_milliseconds == 0 {
                DEFAULT_PROCESSING_TIMEOUT_MS
            } else {
                processing_timeout_milliseconds
            },
            stop_on_error,
        }
    }

    /// The per-message processing deadline, clamped to the default when the
    /// stored value is `<= 0`. Fields on this struct are `pub` for
    /// struct-literal construction, so this is the single point of use that
    /// enforces the boundary regardless of how the config was built.
    pub(crate) fn effective_processing_timeout_ms(&self) -> u64 {
        if self.processing_timeout_milliseconds == 0 {
            DEFAULT_PROCESSING_TIMEOUT_MS
        } else {
            self.processing_timeout_milliseconds
        }
    }
}
