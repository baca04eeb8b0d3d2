//! Pulls messages from an [`InboundAdapter`](crate::broker::InboundAdapter)
//! and processes them through a [`Gateway`](crate::pipeline::Gateway) with
//! bounded concurrency.

mod config;
mod error;
mod worker_registry;
mod worker_token;

pub use config::ConsumerConfig;
pub use error::ConsumerError;

use crate::broker::{InboundAdapter, ReceiveError};
use crate::message::{Message, MessageContext};
use crate::pipeline::Gateway;
use gomes_sync::StopSignal;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use worker_registry::WorkerRegistry;
use worker_token::WorkerToken;

/// Lifecycle states of an [`EventDrivenConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Constructed but never run.
    Idle,
    /// `run` is executing its receive/worker loops.
    Running,
    /// Shutdown is in progress.
    Stopping,
    /// Terminal. `run` will not execute again on this instance.
    Stopped,
}

/// Per-`run` state, torn down at the end of the shutdown sequence.
struct RunHandle {
    run_token: CancellationToken,
    stop_signal: StopSignal,
}

/// Pulls messages from an inbound adapter and processes them through a
/// gateway with bounded concurrency.
///
/// `run` is not restartable: once a consumer reaches [`ConsumerState::Stopped`]
/// it stays there, and a second call to `run` returns immediately.
pub struct EventDrivenConsumer {
    name: Arc<str>,
    adapter: Arc<dyn InboundAdapter>,
    gateway: Arc<Gateway>,
    config: ConsumerConfig,
    state: Mutex<ConsumerState>,
    handle: Mutex<Option<RunHandle>>,
    stop_cause: Mutex<Option<ConsumerError>>,
    stopped_once: AtomicBool,
}

impl EventDrivenConsumer {
    /// Builds a consumer. Nothing runs until [`run`](Self::run) is called.
    pub fn new(
        name: impl Into<Arc<str>>,
        adapter: Arc<dyn InboundAdapter>,
        gateway: Arc<Gateway>,
        config: ConsumerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            adapter,
            gateway,
            config,
            state: Mutex::new(ConsumerState::Idle),
            handle: Mutex::new(None),
            stop_cause: Mutex::new(None),
            stopped_once: AtomicBool::new(false),
        })
    }

    /// The name this consumer was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Runs the consumer until [`stop`](Self::stop) is called, `external` is
    /// cancelled, or a fatal error tears it down under `stopOnError`.
    ///
    /// Returns the terminal cause: `Ok(())` is never produced, since the
    /// run loop's internal cancellation cause is always populated by the
    /// time it exits.
    pub async fn run(self: &Arc<Self>, external: CancellationToken) -> Result<(), ConsumerError> {
        {
            let mut state = self.state.lock();
            if *state != ConsumerState::Idle {
                return Err(ConsumerError::Cancelled);
            }
            *state = ConsumerState::Running;
        }

        let run_token = external.child_token();
        let stop_signal = StopSignal::new();
        *self.handle.lock() = Some(RunHandle {
            run_token: run_token.clone(),
            stop_signal: stop_signal.clone(),
        });

        let processors = self.config.amount_of_processors.max(1);
        let (sender, receiver) = mpsc::channel::<Message>(processors);
        let receiver = Arc::new(AsyncMutex::new(receiver));
        // No dedicated shutdown-timeout knob exists yet, so the drain wait
        // reuses the per-message processing deadline: a worker that is stuck
        // mid-handler would already have tripped that deadline on its own.
        let registry = Arc::new(WorkerRegistry::new(Duration::from_millis(
            self.config.effective_processing_timeout_ms(),
        )));

        for index in 0..processors {
            let token = registry.register(&format!("{}-worker-{index}", self.name));
            let consumer = Arc::clone(self);
            let receiver = Arc::clone(&receiver);
            let worker_run_token = run_token.clone();
            tokio::spawn(async move {
                consumer.worker_loop(receiver, worker_run_token, token).await;
            });
        }

        info!(consumer = %self.name, workers = processors, "consumer started");

        let run_result = self.receive_loop(&run_token, &stop_signal, sender).await;

        *self.state.lock() = ConsumerState::Stopping;

        if let Err(error) = self.adapter.close().await {
            warn!(consumer = %self.name, %error, "failed to close inbound adapter during shutdown");
        }

        if let Err(timeout) = registry.drained(&self.name).await {
            error!(consumer = %self.name, %timeout, "workers did not exit before the shutdown timeout");
        }

        stop_signal.trip();
        *self.handle.lock() = None;
        *self.state.lock() = ConsumerState::Stopped;

        info!(consumer = %self.name, "consumer stopped");

        run_result
    }

    /// Requests a graceful stop. Idempotent; safe to call from any task,
    /// including before `run` has started (the request is then a no-op,
    /// since there is nothing to cancel yet).
    pub fn stop(&self) {
        self.trigger_stop(None);
    }

    fn trigger_stop(&self, cause: Option<ConsumerError>) {
        if self.stopped_once.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(cause) = cause {
            *self.stop_cause.lock() = Some(cause);
        }

        if let Some(handle) = self.handle.lock().as_ref() {
            handle.run_token.cancel();
            handle.stop_signal.trip();
        }
    }

    async fn receive_loop(
        &self,
        run_token: &CancellationToken,
        stop_signal: &StopSignal,
        sender: mpsc::Sender<Message>,
    ) -> Result<(), ConsumerError> {
        let stop_watcher = stop_signal.watcher();

        loop {
            if run_token.is_cancelled() {
                break;
            }

            let received = select! {
                biased;
                _ = run_token.cancelled() => break,
                received = self.adapter.receive() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(ReceiveError::Cancelled) => break,
                Err(error @ ReceiveError::Transport(_)) => {
                    warn!(consumer = %self.name, %error, "receive failed");
                    if self.config.stop_on_error {
                        self.trigger_stop(Some(ConsumerError::Fatal(Arc::new(error))));
                        break;
                    }
                    continue;
                }
            };

            select! {
                biased;
                _ = stop_watcher.tripped() => break,
                send_result = sender.send(message) => {
                    if send_result.is_err() {
                        break;
                    }
                }
            }
        }

        drop(sender);

        match self.stop_cause.lock().clone() {
            Some(cause) => Err(cause),
            None => Err(ConsumerError::Cancelled),
        }
    }

    async fn worker_loop(
        self: Arc<Self>,
        receiver: Arc<AsyncMutex<mpsc::Receiver<Message>>>,
        run_token: CancellationToken,
        token: WorkerToken,
    ) {
        loop {
            if run_token.is_cancelled() {
                break;
            }

            let message = select! {
                biased;
                _ = run_token.cancelled() => break,
                message = Self::dequeue(&receiver) => message,
            };

            let Some(message) = message else {
                break;
            };

            self.process(message, &run_token).await;
        }

        drop(token);
    }

    async fn dequeue(receiver: &Arc<AsyncMutex<mpsc::Receiver<Message>>>) -> Option<Message> {
        receiver.lock().await.recv().await
    }

    async fn process(&self, message: Message, run_token: &CancellationToken) {
        let op_token = run_token.child_token();
        let message = message.with_context(MessageContext::new(op_token.clone()));
        let timeout = Duration::from_millis(self.config.effective_processing_timeout_ms());

        let timed_out = select! {
            biased;
            result = self.gateway.execute(message) => {
                if let Err(error) = result {
                    warn!(consumer = %self.name, %error, "message processing failed");
                    if self.config.stop_on_error {
                        self.trigger_stop(Some(ConsumerError::Fatal(Arc::new(error))));
                    }
                }
                false
            }
            _ = tokio::time::sleep(timeout) => true,
        };

        if timed_out {
            op_token.cancel();
            warn!(consumer = %self.name, "message exceeded the processing deadline");
            if self.config.stop_on_error {
                self.trigger_stop(Some(ConsumerError::DeadlineExceeded));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{ChannelDeclarations, ChannelMessageAcknowledgment, CloseError, CommitError, PublishError, PublisherChannel};
    use crate::message::{MessageBuilder, MessageType};
    use crate::pipeline::Gateway;
    use crate::registry::Registry;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex as StdMutex;
    use tokio::time::{Duration as TokioDuration, Instant};

    struct RecordingChannel {
        name: String,
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl PublisherChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, message: &Message) -> Result<(), PublishError> {
            self.sent.lock().unwrap().push(message.payload().to_vec());
            Ok(())
        }
    }

    struct CountingAcknowledger {
        commits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChannelMessageAcknowledgment for CountingAcknowledger {
        async fn commit_message(&self, _raw_message: &(dyn Any + Sync)) -> Result<(), CommitError> {
            self.commits.fetch_add(1, AtomicOrdering::Relaxed);
            Ok(())
        }
    }

    /// An adapter fed by a fixed, FIFO list of payloads, then blocks until
    /// closed.
    struct ScriptedAdapter {
        name: String,
        messages: StdMutex<std::collections::VecDeque<Vec<u8>>>,
        closed: Arc<tokio::sync::Notify>,
        declarations: ChannelDeclarations,
        acknowledger: Arc<CountingAcknowledger>,
    }

    #[async_trait]
    impl crate::broker::InboundAdapter for ScriptedAdapter {
        fn reference_name(&self) -> &str {
            &self.name
        }

        async fn receive(&self) -> Result<Message, ReceiveError> {
            if let Some(payload) = self.messages.lock().unwrap().pop_front() {
                let message = MessageBuilder::new(MessageType::Event)
                    .payload(payload)
                    .route("sink")
                    .build()
                    .unwrap()
                    .with_raw_message(Arc::new(1u8));
                return Ok(message);
            }

            self.closed.notified().await;
            Err(ReceiveError::Cancelled)
        }

        async fn close(&self) -> Result<(), CloseError> {
            self.closed.notify_waiters();
            Ok(())
        }

        fn declarations(&self) -> &ChannelDeclarations {
            &self.declarations
        }

        fn as_acknowledger(&self) -> Option<&dyn ChannelMessageAcknowledgment> {
            Some(self.acknowledger.as_ref())
        }
    }

    fn single_worker_gateway(sink_sent: Arc<StdMutex<Vec<Vec<u8>>>>, commits: Arc<AtomicUsize>) -> (Arc<Gateway>, Arc<CountingAcknowledger>) {
        let sink = Arc::new(RecordingChannel {
            name: "sink".to_string(),
            sent: sink_sent,
        }) as Arc<dyn PublisherChannel>;
        let channels = Arc::new(Registry::new());
        channels.set("sink", sink).unwrap();
        let acknowledger = Arc::new(CountingAcknowledger { commits });
        let interceptors = Registry::new();
        let gateway = Gateway::build(
            &ChannelDeclarations::default(),
            channels,
            Some(acknowledger.clone() as Arc<dyn ChannelMessageAcknowledgment>),
            &interceptors,
        )
        .unwrap();

        (Arc::new(gateway), acknowledger)
    }

    #[tokio::test]
    async fn single_worker_preserves_receive_order() {
        // Given
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let commits = Arc::new(AtomicUsize::new(0));
        let (gateway, acknowledger) = single_worker_gateway(sent.clone(), commits);

        let adapter = Arc::new(ScriptedAdapter {
            name: "scripted".to_string(),
            messages: StdMutex::new(vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()].into()),
            closed: Arc::new(tokio::sync::Notify::new()),
            declarations: ChannelDeclarations::default(),
            acknowledger,
        });
        let consumer = EventDrivenConsumer::new(
            "scripted-consumer",
            adapter as Arc<dyn InboundAdapter>,
            gateway,
            ConsumerConfig::new(1, 5_000, true),
        );

        // When: the script drains quickly, then `stop` is requested once
        // all three messages have had time to land.
        let runner = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            async move { consumer.run(CancellationToken::new()).await }
        });
        tokio::time::sleep(TokioDuration::from_millis(50)).await;
        consumer.stop();
        let result = tokio::time::timeout(TokioDuration::from_secs(2), runner).await;

        // Then
        assert!(result.is_ok());
        assert_eq!(*sent.lock().unwrap(), vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn stop_returns_run_within_a_bounded_time() {
        // Given
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let commits = Arc::new(AtomicUsize::new(0));
        let (gateway, acknowledger) = single_worker_gateway(sent, commits);
        let adapter = Arc::new(ScriptedAdapter {
            name: "scripted".to_string(),
            messages: StdMutex::new(std::collections::VecDeque::new()),
            closed: Arc::new(tokio::sync::Notify::new()),
            declarations: ChannelDeclarations::default(),
            acknowledger,
        });
        let consumer = EventDrivenConsumer::new(
            "idle-consumer",
            adapter as Arc<dyn InboundAdapter>,
            gateway,
            ConsumerConfig::new(2, 5_000, true),
        );

        // When
        let start = Instant::now();
        let runner = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            async move { consumer.run(CancellationToken::new()).await }
        });
        tokio::time::sleep(TokioDuration::from_millis(10)).await;
        consumer.stop();
        let result = tokio::time::timeout(TokioDuration::from_secs(1), runner).await;

        // Then
        assert!(result.is_ok(), "run did not return within the bounded timeout");
        assert!(start.elapsed() < TokioDuration::from_secs(1));
        assert!(matches!(result.unwrap().unwrap(), Err(ConsumerError::Cancelled)));
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn struct_literal_zero_timeout_does_not_cause_instant_deadline_failures() {
        // Given: a config built by struct literal, bypassing `new`'s clamp.
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let commits = Arc::new(AtomicUsize::new(0));
        let (gateway, acknowledger) = single_worker_gateway(sent.clone(), commits);
        let adapter = Arc::new(ScriptedAdapter {
            name: "scripted".to_string(),
            messages: StdMutex::new(vec![b"one".to_vec()].into()),
            closed: Arc::new(tokio::sync::Notify::new()),
            declarations: ChannelDeclarations::default(),
            acknowledger,
        });
        let consumer = EventDrivenConsumer::new(
            "zero-timeout-consumer",
            adapter as Arc<dyn InboundAdapter>,
            gateway,
            ConsumerConfig {
                amount_of_processors: 1,
                processing_timeout_milliseconds: 0,
                stop_on_error: true,
            },
        );

        // When
        let runner = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            async move { consumer.run(CancellationToken::new()).await }
        });
        tokio::time::sleep(TokioDuration::from_millis(50)).await;
        consumer.stop();
        let result = tokio::time::timeout(TokioDuration::from_secs(2), runner).await;

        // Then: the message was processed rather than treated as an instant
        // deadline violation, and the consumer did not stop itself early.
        assert!(result.is_ok());
        assert_eq!(*sent.lock().unwrap(), vec![b"one".to_vec()]);
        assert!(matches!(result.unwrap().unwrap(), Err(ConsumerError::Cancelled)));
    }

    #[test]
    fn new_consumer_starts_idle() {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let commits = Arc::new(AtomicUsize::new(0));
        let (gateway, acknowledger) = single_worker_gateway(sent, commits);
        let adapter = Arc::new(ScriptedAdapter {
            name: "scripted".to_string(),
            messages: StdMutex::new(std::collections::VecDeque::new()),
            closed: Arc::new(tokio::sync::Notify::new()),
            declarations: ChannelDeclarations::default(),
            acknowledger,
        });
        let consumer = EventDrivenConsumer::new(
            "fresh",
            adapter as Arc<dyn InboundAdapter>,
            gateway,
            ConsumerConfig::default(),
        );

        assert_eq!(consumer.state(), ConsumerState::Idle);
    }
}
