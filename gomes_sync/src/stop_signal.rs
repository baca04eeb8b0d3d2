use tokio_util::sync::CancellationToken;

/// A one-shot signal that, once [tripped](StopSignal::trip), wakes every
/// [`StopWatcher`] derived from it. Used by the event-driven consumer to
/// wake a blocked `Receive` or queue-offer when shutdown is requested while
/// the receive loop is not otherwise polling for cancellation.
///
/// ## Example
///
/// ```
/// use gomes_sync::{StopSignal, StopWatcher};
///
/// # tokio_test::block_on(async {
/// let signal = StopSignal::new();
/// let watcher = signal.watcher();
///
/// tokio::spawn(async move {
///     // pretend to drain the inbound queue
///     println!("draining queue");
///     signal.trip();
/// });
///
/// watcher.tripped().await;
/// println!("consumer stopped");
/// # })
/// ```
#[derive(Debug, Default, Clone)]
pub struct StopSignal {
    token: CancellationToken,
}

/// A handle that observes when the associated [`StopSignal`] has been
/// [tripped](StopSignal::trip). Cheap to clone; any number of workers may
/// hold and await on a copy.
#[derive(Debug, Clone)]
pub struct StopWatcher {
    token: CancellationToken,
}

impl StopSignal {
    /// Returns a fresh, untripped signal.
    pub fn new() -> Self {
        let token = CancellationToken::new();

        Self { token }
    }

    /// Derives a [`StopWatcher`] linked to this signal. Any number of
    /// watchers may be derived and awaited independently.
    pub fn watcher(&self) -> StopWatcher {
        StopWatcher {
            token: self.token.clone(),
        }
    }

    /// Permanently trips the signal, waking every derived [`StopWatcher`].
    /// Idempotent: calling this more than once has no further effect.
    pub fn trip(&self) {
        self.token.cancel();
    }
}

impl StopWatcher {
    /// Waits until the associated [`StopSignal`] is tripped. Resolves
    /// immediately if it has already been tripped.
    pub async fn tripped(&self) {
        self.token.cancelled().await;
    }

    /// Reports whether the associated [`StopSignal`] has already tripped.
    pub fn is_tripped(&self) -> bool {
        self.token.is_cancelled()
    }
}
