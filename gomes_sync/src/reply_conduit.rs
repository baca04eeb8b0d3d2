use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Notify};

/// Carries exactly one reply across an in-process command/query round trip.
///
/// A fresh [`ReplyConduit`] is built for every round trip: the side
/// publishing the request keeps a [`ReplyAwaiter`] and blocks on
/// [`request`](ReplyAwaiter::request)/[`request_with_timeout`](ReplyAwaiter::request_with_timeout),
/// while the conduit itself travels with the request (as its
/// `internalReplyChannel`) until the handler producing the reply calls
/// [`fulfill`](ReplyConduit::fulfill).
///
/// ## Error handling
///
/// Fulfilling a reply is not atomic: the awaiter registers interest, the
/// handler eventually produces a value, and only then does the awaiter
/// receive it. Either side may stop existing at any point in this sequence —
/// the caller may give up waiting, or the handler may never run because the
/// channel it was published to was torn down first. None of these cases are
/// treated as a bug: they surface as `None` rather than a panic or a logged
/// error.
///
/// # Example
///
/// ```rust
/// use gomes_sync::ReplyConduit;
///
/// #[tokio::main]
/// async fn main() {
///     let conduit: ReplyConduit<String> = ReplyConduit::new();
///     let awaiter = conduit.awaiter();
///
///     let handler = tokio::spawn(async move {
///         conduit.fulfill("{\"ok\":true}".to_string()).await;
///     });
///
///     let caller = tokio::spawn(async move {
///         let reply = awaiter.request().await.unwrap();
///         assert_eq!(&reply, "{\"ok\":true}");
///     });
///
///     caller.await.unwrap();
///     handler.await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct ReplyConduit<T> {
    listener: AsyncMutex<mpsc::Receiver<oneshot::Sender<T>>>,
    requester_template: mpsc::Sender<oneshot::Sender<T>>,
}

/// A cheaply-cloneable handle that a caller awaiting a reply on the linked
/// [`ReplyConduit`] uses to request it.
#[derive(Debug, Clone)]
pub struct ReplyAwaiter<T> {
    requester: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T> ReplyConduit<T> {
    /// Creates a new conduit with no pending requests.
    pub fn new() -> Self {
        // There is no point buffering requests: the awaiter waits for a
        // reply immediately after requesting one.
        let (requester_template, listener) = mpsc::channel(1);

        Self {
            listener: AsyncMutex::new(listener),
            requester_template,
        }
    }

    /// Derives a [`ReplyAwaiter`] linked to this conduit. May be cloned and
    /// shared among any number of tasks.
    pub fn awaiter(&self) -> ReplyAwaiter<T> {
        ReplyAwaiter {
            requester: self.requester_template.clone(),
        }
    }

    /// Waits for a reply to be requested by any linked [`ReplyAwaiter`], and
    /// returns the channel through which the reply should be sent back.
    ///
    /// Only one task may call this at a time; concurrent callers would race
    /// for the same underlying `mpsc` receiver.
    pub async fn requested(&self) -> oneshot::Sender<T> {
        let mut listener = self.listener.lock().await;

        listener.recv().await.expect(concat!(
            "the mpsc channel backing this conduit cannot close while the",
            " conduit itself is alive: it retains both the receiver and at",
            " least one sender, and never calls `close` on the receiver",
        ))
    }

    /// Waits for a reply to be requested, then delivers `reply` to whichever
    /// [`ReplyAwaiter`] requested it.
    ///
    /// This is what a reply-to handler calls once it has produced the
    /// response for a request it is holding the `internalReplyChannel` of.
    /// The awaiter may no longer be listening by the time the reply is
    /// ready — it may have timed out or been dropped — and that is not
    /// treated as a failure: the reply is simply discarded.
    pub async fn fulfill(&self, reply: T) {
        let reply_sink = self.requested().await;
        let _ = reply_sink.send(reply);
    }
}

impl<T> Default for ReplyConduit<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReplyAwaiter<T> {
    /// Requests a reply and waits for it, potentially forever (for example
    /// if the owning conduit no longer exists).
    ///
    /// Useful when the caller genuinely cannot proceed without a reply and
    /// there is good reason to expect one eventually — this exerts useful
    /// backpressure rather than returning a hollow result.
    pub async fn anticipate(&self) -> T {
        if let Some(value) = self.request().await {
            return value;
        }

        // No hope of a reply remains, but the caller accepted waiting forever.
        pending::<()>().await;
        unreachable!()
    }

    /// Requests a reply. Returns `None` if the conduit no longer exists or
    /// the request is dropped without a reply ever being sent.
    pub async fn request(&self) -> Option<T> {
        let (reply_sender, reply_receiver) = oneshot::channel();

        if self.requester.send(reply_sender).await.is_err() {
            return None;
        }

        reply_receiver.await.ok()
    }

    /// Requests a reply, giving up after `timeout` elapses.
    pub async fn request_with_timeout(&self, timeout: Duration) -> Option<T> {
        let notify_in = Arc::new(Notify::new());
        let notify_out = Arc::clone(&notify_in);

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            notify_in.notify_one();
        });

        select! {
            biased;
            reply = self.request() => reply,
            _ = notify_out.notified() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::panic::AssertUnwindSafe;
    use tokio::task;

    #[tokio::test]
    async fn simple_request_reply() {
        // Given
        let conduit = ReplyConduit::new();
        let awaiter = conduit.awaiter();

        // When
        let producer_task = task::spawn(async move {
            for i in 0..2 {
                let reply_sink = conduit.requested().await;
                reply_sink.send(format!("reply_{}", i)).unwrap();
            }
        });

        let requested_reply = awaiter.request().await;
        let anticipated_reply = awaiter.anticipate().await;

        // Then
        assert_eq!(requested_reply.unwrap(), "reply_0");
        assert_eq!(anticipated_reply, "reply_1");
        assert!(producer_task.await.is_ok());
    }

    #[tokio::test]
    async fn fulfill_delivers_the_reply_to_the_awaiter() {
        // Given
        let conduit: ReplyConduit<&str> = ReplyConduit::new();
        let awaiter = conduit.awaiter();

        // When
        let handler_task = task::spawn(async move {
            conduit.fulfill("reply").await;
        });
        let reply = awaiter.request().await;

        // Then
        assert_eq!(reply, Some("reply"));
        assert!(handler_task.await.is_ok());
    }

    #[tokio::test]
    async fn fulfill_is_a_no_op_when_the_awaiter_gave_up_before_the_reply_arrived() {
        // Given: a request whose oneshot receiver was already dropped, as
        // happens once `request_with_timeout` gives up.
        let conduit: ReplyConduit<&str> = ReplyConduit::new();
        let awaiter = conduit.awaiter();
        let (reply_sender, reply_receiver) = oneshot::channel();
        drop(reply_receiver);
        awaiter.requester.send(reply_sender).await.unwrap();

        // Then: fulfilling doesn't panic even though nobody is listening.
        conduit.fulfill("too late").await;
    }

    #[tokio::test]
    async fn timed_out_request_returns_none() {
        // Given
        let conduit = ReplyConduit::new();
        let awaiter = conduit.awaiter();

        // When
        let producer_task = task::spawn(async move {
            let reply_sink = conduit.requested().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            reply_sink.send("late reply").unwrap();
        });

        let requested_reply = awaiter.request_with_timeout(Duration::from_millis(10)).await;

        // Then
        assert_eq!(requested_reply, None);
        assert!(producer_task.await.is_err());
    }

    #[tokio::test]
    async fn concurrent_callers_each_get_a_reply() {
        // Given
        let conduit = ReplyConduit::new();
        let awaiter = conduit.awaiter();

        // When
        let producer_task = task::spawn(async move {
            for _ in 0..5 {
                let reply_sink = conduit.requested().await;
                reply_sink.send("reply").unwrap();
            }
        });

        let mut caller_tasks = vec![];
        for _ in 0..5 {
            let awaiter = awaiter.clone();
            caller_tasks.push(task::spawn(async move {
                let reply = awaiter.request().await;
                assert_eq!(reply.unwrap(), "reply");
            }));
        }

        // Then
        for caller_task in caller_tasks {
            assert!(caller_task.await.is_ok());
        }
        assert!(producer_task.await.is_ok());
    }

    #[tokio::test]
    async fn replies_are_delivered_in_request_order() {
        // Given
        let conduit = ReplyConduit::new();
        let awaiter = conduit.awaiter();

        // When
        let producer_task = task::spawn(async move {
            for scheduled_reply in 0..5 {
                let reply_sink = conduit.requested().await;
                reply_sink.send(scheduled_reply).unwrap();
            }
        });

        let caller_task = task::spawn(async move {
            for expected_reply in 0..5 {
                let reply = awaiter.request().await;
                assert_eq!(reply.unwrap(), expected_reply);
            }
        });

        // Then
        assert!(caller_task.await.is_ok());
        assert!(producer_task.await.is_ok());
    }

    #[tokio::test]
    async fn request_after_conduit_dropped_returns_none() {
        // Given
        let (requester_template, mut listener): (
            mpsc::Sender<oneshot::Sender<usize>>,
            mpsc::Receiver<oneshot::Sender<usize>>,
        ) = mpsc::channel(1);
        listener.close();

        let awaiter = ReplyAwaiter {
            requester: requester_template,
        };

        // When
        let result = awaiter.request().await;

        // Then
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn reply_sink_dropped_without_sending() {
        // Given
        let conduit: ReplyConduit<usize> = ReplyConduit::new();
        let awaiter = conduit.awaiter();

        // When
        let producer_task = task::spawn(async move {
            let _reply_sink = conduit.requested().await;
        });
        let result = awaiter.request().await;

        // Then
        assert!(result.is_none());
        assert!(producer_task.await.is_ok());
    }

    #[tokio::test]
    async fn requested_panics_if_channel_closed() {
        // Given
        let (requester_template, mut listener): (
            mpsc::Sender<oneshot::Sender<usize>>,
            mpsc::Receiver<oneshot::Sender<usize>>,
        ) = mpsc::channel(1);
        listener.close();

        let conduit = ReplyConduit {
            listener: AsyncMutex::new(listener),
            requester_template,
        };

        // When
        let outcome = AssertUnwindSafe(async {
            conduit.requested().await;
        })
        .catch_unwind()
        .await;

        // Then
        assert!(outcome.is_err());
    }
}
