use crate::consumer::worker_token::WorkerToken;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex;
use scopeguard::defer;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::select;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Tracks the worker tasks a single [`EventDrivenConsumer`](super::EventDrivenConsumer)
/// has spawned, and waits (within a timeout) for all of them to report
/// completion during the consumer's shutdown sequence.
///
/// Scoped to one consumer instance rather than shared process-wide: a
/// process hosting several consumers gets one registry each, which keeps
/// every consumer's shutdown independently testable.
pub(crate) struct WorkerRegistry {
    workers: Mutex<Vec<TrackedWorker>>,
    timeout: Duration,
}

impl WorkerRegistry {
    /// Creates a registry that waits up to `timeout` for registered workers
    /// to complete.
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            timeout,
        }
    }

    /// Registers a worker identified by `name` (not required to be unique)
    /// and returns the [`WorkerToken`] it must punch out when it exits.
    pub(crate) fn register(&self, name: &str) -> WorkerToken {
        let worker = TrackedWorker::new(name);
        let token = worker.token();

        self.workers.lock().push(worker);

        token
    }

    /// Waits until every currently registered worker has punched out, or
    /// until the timeout elapses, whichever comes first.
    pub(crate) async fn drained(&self, consumer_name: &str) -> Result<usize, DrainTimeout> {
        info!(consumer = consumer_name, "waiting for workers to exit");

        let notify_in = Arc::new(Notify::new());
        let notify_out = Arc::clone(&notify_in);

        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            notify_in.notify_one();
        });
        defer! { timer.abort() }

        let workers = {
            let mut guard = self.workers.lock();
            std::mem::take(&mut *guard)
        };

        let total = workers.len();
        if total == 0 {
            info!(consumer = consumer_name, "no workers to drain");
            return Ok(0);
        }

        let mut remaining = total;
        let mut futures = workers
            .into_iter()
            .map(TrackedWorkerFuture::from)
            .collect::<FuturesUnordered<_>>();

        loop {
            let outcome = select! {
                biased;
                _ = notify_out.notified() => DrainOutcome::TimedOut,
                next = futures.next() => Self::observe(next, &futures, consumer_name),
            };

            match outcome {
                DrainOutcome::Exited => remaining -= 1,
                DrainOutcome::AllExited => return Ok(total),
                DrainOutcome::TimedOut => {
                    for worker in &futures {
                        error!(
                            consumer = consumer_name,
                            worker = worker.name.as_ref(),
                            "worker did not exit before the shutdown timeout",
                        );
                    }
                    warn!(consumer = consumer_name, "shutdown timed out waiting for workers");
                    return Err(DrainTimeout {
                        exited: total - remaining,
                        timed_out: remaining,
                    });
                }
            }
        }
    }

    fn observe(
        next: Option<Arc<str>>,
        futures: &FuturesUnordered<TrackedWorkerFuture>,
        consumer_name: &str,
    ) -> DrainOutcome {
        match next {
            Some(worker) => info!(consumer = consumer_name, worker = worker.as_ref(), "exited"),
            None => warn!(consumer = consumer_name, "drained with no remaining workers"),
        }

        if futures.is_empty() {
            DrainOutcome::AllExited
        } else {
            DrainOutcome::Exited
        }
    }
}

enum DrainOutcome {
    Exited,
    AllExited,
    TimedOut,
}

/// Raised when not every registered worker exited before the shutdown
/// timeout elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DrainTimeout {
    pub exited: usize,
    pub timed_out: usize,
}

impl fmt::Display for DrainTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} worker(s) exited, {} timed out during shutdown",
            self.exited, self.timed_out
        )
    }
}

impl std::error::Error for DrainTimeout {}

struct TrackedWorker {
    name: Arc<str>,
    token: CancellationToken,
}

impl TrackedWorker {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            token: CancellationToken::new(),
        }
    }

    fn token(&self) -> WorkerToken {
        WorkerToken::new(self.token.clone())
    }
}

impl From<TrackedWorker> for TrackedWorkerFuture {
    fn from(worker: TrackedWorker) -> Self {
        let token_future = Box::pin(async move { worker.token.cancelled().await });

        TrackedWorkerFuture {
            name: worker.name,
            token_future,
        }
    }
}

struct TrackedWorkerFuture {
    name: Arc<str>,
    token_future: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl Future for TrackedWorkerFuture {
    type Output = Arc<str>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.token_future.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(()) => Poll::Ready(self.name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    #[tokio::test]
    async fn no_workers_drains_immediately() {
        // Given
        let registry = WorkerRegistry::new(Duration::from_secs(5));
        let start = Instant::now();

        // When
        let exited = registry.drained("consumer").await.unwrap();

        // Then
        assert_eq!(exited, 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn all_workers_punching_out_drains_quickly() {
        // Given
        let registry = WorkerRegistry::new(Duration::from_secs(5));
        let token1 = registry.register("worker-0");
        let token2 = registry.register("worker-1");

        // When
        token1.punch_out();
        token2.punch_out();
        let exited = registry.drained("consumer").await.unwrap();

        // Then
        assert_eq!(exited, 2);
    }

    #[tokio::test]
    async fn dropped_token_counts_as_punched_out() {
        // Given
        let registry = WorkerRegistry::new(Duration::from_secs(5));
        {
            let _token = registry.register("worker-0");
        }

        // When
        let exited = registry.drained("consumer").await.unwrap();

        // Then
        assert_eq!(exited, 1);
    }

    #[tokio::test]
    async fn hanging_worker_times_out() {
        // Given
        let registry = WorkerRegistry::new(Duration::from_millis(50));
        let _token = registry.register("worker-0");

        // When
        let error = registry.drained("consumer").await.unwrap_err();

        // Then
        assert_eq!(
            error,
            DrainTimeout {
                exited: 0,
                timed_out: 1
            }
        );
    }
}
