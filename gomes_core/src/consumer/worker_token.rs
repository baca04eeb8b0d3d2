use tokio_util::sync::CancellationToken;

/// A token issued to a worker tracked by a [`WorkerRegistry`](super::worker_registry::WorkerRegistry),
/// used to signal that the worker has exited and released whatever it held.
///
/// Dropping the token punches out automatically, so a worker loop need not
/// remember to call [`punch_out`](WorkerToken::punch_out) on every exit
/// path — letting the token go out of scope on return is enough.
pub struct WorkerToken {
    token: CancellationToken,
}

impl WorkerToken {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Signals that the worker holding this token has finished.
    pub fn punch_out(&self) {
        self.token.cancel();
    }
}

impl Drop for WorkerToken {
    fn drop(&mut self) {
        self.punch_out();
    }
}
