use crate::message::Message;
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Runs a list of interceptors in registration order *before* the inner
/// chain, short-circuiting on the first failure.
pub struct BeforeInterceptors {
    interceptors: Vec<Arc<dyn Handler>>,
    inner: Arc<dyn Handler>,
}

impl BeforeInterceptors {
    /// Wraps `inner` with `interceptors`, run in order before it.
    pub fn new(interceptors: Vec<Arc<dyn Handler>>, inner: Arc<dyn Handler>) -> Self {
        Self { interceptors, inner }
    }
}

#[async_trait]
impl Handler for BeforeInterceptors {
    async fn handle(&self, mut message: Message) -> Result<Message, PipelineError> {
        for interceptor in &self.interceptors {
            message = interceptor.handle(message).await?;
        }

        self.inner.handle(message).await
    }
}

/// Runs a list of interceptors in registration order *after* the inner
/// chain has terminated, observing both outcomes.
///
/// After-interceptors only run once the inner chain has actually been
/// entered: they never run for a message a before-interceptor rejected,
/// since this wrapper sits *inside* [`BeforeInterceptors`] in the gateway's
/// composition order.
pub struct AfterInterceptors {
    interceptors: Vec<Arc<dyn Handler>>,
    inner: Arc<dyn Handler>,
}

impl AfterInterceptors {
    /// Wraps `inner` with `interceptors`, run in order after it.
    pub fn new(interceptors: Vec<Arc<dyn Handler>>, inner: Arc<dyn Handler>) -> Self {
        Self { interceptors, inner }
    }
}

#[async_trait]
impl Handler for AfterInterceptors {
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        let fallback = message.clone();
        let result = self.inner.handle(message).await;

        // After-interceptors see whatever message is available — the
        // produced one on success, or the pre-chain envelope on failure —
        // and never change whether the overall call succeeded or failed.
        let mut observed = match &result {
            Ok(message) => message.clone(),
            Err(_) => fallback,
        };

        for interceptor in &self.interceptors {
            match interceptor.handle(observed.clone()).await {
                Ok(next) => observed = next,
                Err(error) => {
                    error!(error = %error, "after-interceptor failed; ignoring");
                }
            }
        }

        result.map(|_| observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageBuilder, MessageType};
    use crate::pipeline::handler::FnHandler;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_interceptor(counter: Arc<AtomicUsize>) -> Arc<dyn Handler> {
        Arc::new(FnHandler(move |m: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(m)
            }
        }))
    }

    fn rejecting_interceptor() -> Arc<dyn Handler> {
        Arc::new(FnHandler(|_: Message| async {
            Err(PipelineError::new("rejected"))
        }))
    }

    fn message() -> Message {
        MessageBuilder::new(MessageType::Event).build().unwrap()
    }

    #[tokio::test]
    async fn before_interceptors_run_in_order_then_inner() {
        // Given
        let reached_inner = Arc::new(AtomicUsize::new(0));
        let inner = counting_interceptor(reached_inner.clone());
        let counter = Arc::new(AtomicUsize::new(0));
        let before = BeforeInterceptors::new(
            vec![counting_interceptor(counter.clone()), counting_interceptor(counter.clone())],
            inner,
        );

        // When
        before.handle(message()).await.unwrap();

        // Then
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert_eq!(reached_inner.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn before_interceptor_short_circuits() {
        // Given
        let reached_inner = Arc::new(AtomicUsize::new(0));
        let inner = counting_interceptor(reached_inner.clone());
        let before = BeforeInterceptors::new(vec![rejecting_interceptor()], inner);

        // When
        let result = before.handle(message()).await;

        // Then
        assert!(result.is_err());
        assert_eq!(reached_inner.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn after_interceptors_run_once_inner_succeeds() {
        // Given
        let succeeds: Arc<dyn Handler> = Arc::new(FnHandler(|m: Message| async { Ok(m) }));
        let counter = Arc::new(AtomicUsize::new(0));
        let after = AfterInterceptors::new(vec![counting_interceptor(counter.clone())], succeeds);

        // When
        after.handle(message()).await.unwrap();

        // Then
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn after_interceptors_still_run_on_inner_failure_but_error_wins() {
        // Given
        let fails: Arc<dyn Handler> =
            Arc::new(FnHandler(|_: Message| async { Err(PipelineError::new("boom")) }));
        let counter = Arc::new(AtomicUsize::new(0));
        let after = AfterInterceptors::new(vec![counting_interceptor(counter.clone())], fails);

        // When
        let result = after.handle(message()).await;

        // Then
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
