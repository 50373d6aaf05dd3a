//! # Message Bus
//!
//! One bounded queue, one sequential dispatch loop per bus.
//!
//! ```text
//!  publish ──┐                         ┌──► spawn(handler₁) ─┐
//!            ├──► [ mpsc queue ] ──► loop ─► spawn(handler₂) ─┼─► TaskTracker
//!  publish_sync ┘                      └──► handler₁ → handler₂ → reply
//! ```
//!
//! Async envelopes fan out to one tracked task per matched handler and the
//! loop moves on immediately. Sync envelopes run their handlers in order on
//! the loop itself; the next envelope waits until the publisher has its
//! reply.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::handler::{Delivery, HandlerContext, HandlerError, HandlerResult, MessageHandler};
use crate::message::SharedMessage;
use crate::subscriber::SubscriberRegistry;
use crate::{DEFAULT_QUEUE_CAPACITY, DEFAULT_STOP_TIMEOUT};

/// Bus construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Envelopes buffered before `publish` suspends.
    pub queue_capacity: usize,
    /// Deadline used by [`MessageBus::shutdown`].
    pub stop_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Lifecycle: `Unstarted -> Running -> Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Unstarted,
    Running,
    Stopped,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Envelopes accepted by the queue.
    pub published: u64,
    /// Envelopes taken off the queue by the dispatch loop.
    pub dispatched: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    handler_failures: AtomicU64,
}

/// In-process publish/subscribe bus.
pub struct MessageBus {
    config: BusConfig,
    registry: Arc<SubscriberRegistry>,
    sender: mpsc::Sender<Envelope>,
    /// Taken by `start`.
    receiver: Mutex<Option<mpsc::Receiver<Envelope>>>,
    state: Mutex<BusState>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    #[must_use]
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self::with_config(BusConfig {
            queue_capacity,
            ..BusConfig::default()
        })
    }

    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            config: BusConfig {
                queue_capacity: capacity,
                ..config
            },
            registry: Arc::new(SubscriberRegistry::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            state: Mutex::new(BusState::Unstarted),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the dispatch loop on the current Tokio runtime.
    pub fn start(&self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if *state != BusState::Unstarted {
            return Err(BusError::AlreadyStarted);
        }
        let handle = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let receiver = self.receiver.lock().take().ok_or(BusError::AlreadyStarted)?;

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
            counters: Arc::clone(&self.counters),
        };
        self.tracker.spawn_on(dispatcher.run(receiver), &handle);

        *state = BusState::Running;
        info!(capacity = self.config.queue_capacity, "Message bus started");
        Ok(())
    }

    /// Stop accepting envelopes, drain the queue and wait for in-flight
    /// handlers, up to `deadline`.
    ///
    /// Stopping an unstarted bus just marks it stopped; stopping a stopped
    /// bus does nothing.
    #[instrument(skip(self))]
    pub async fn stop(&self, deadline: Duration) -> Result<(), BusError> {
        {
            let mut state = self.state.lock();
            match *state {
                BusState::Stopped => return Ok(()),
                BusState::Unstarted => {
                    *state = BusState::Stopped;
                    self.shutdown.cancel();
                    self.tracker.close();
                    info!("Message bus stopped before start");
                    return Ok(());
                }
                BusState::Running => *state = BusState::Stopped,
            }
        }

        info!(queued = self.queued(), "Stopping message bus");
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(deadline, self.tracker.wait()).await.is_err() {
            warn!(
                in_flight = self.tracker.len(),
                ?deadline,
                "Message bus shutdown deadline exceeded"
            );
            return Err(BusError::Timeout(deadline));
        }

        info!(stats = ?self.stats(), "Message bus stopped");
        Ok(())
    }

    /// [`stop`](Self::stop) with the configured deadline.
    pub async fn shutdown(&self) -> Result<(), BusError> {
        self.stop(self.config.stop_timeout).await
    }

    #[must_use]
    pub fn state(&self) -> BusState {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == BusState::Running
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    pub fn subscribe(&self, pattern: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.registry.subscribe(pattern, handler);
    }

    /// Remove the first subscription of this exact handler under `pattern`.
    pub fn unsubscribe(&self, pattern: &str, handler: &Arc<dyn MessageHandler>) -> bool {
        self.registry.unsubscribe(pattern, handler)
    }

    #[must_use]
    pub fn subscriber_count(&self, pattern: &str) -> usize {
        self.registry.count(pattern)
    }

    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        self.registry.patterns()
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Enqueue `message` for asynchronous fan-out.
    ///
    /// Suspends only while the queue is full. Handler outcomes are never
    /// reported back.
    pub async fn publish(&self, message: SharedMessage, cancel: &CancellationToken) -> Result<(), BusError> {
        self.check_publishable(&message)?;
        let envelope = Envelope::fire_and_forget(message, cancel.clone());
        self.enqueue(envelope, cancel).await
    }

    /// Enqueue `message` and wait until every matched handler has run.
    ///
    /// Returns the first handler error. Calling this from inside a
    /// synchronously dispatched handler of the same bus deadlocks, since the
    /// loop is busy running that handler.
    pub async fn publish_sync(&self, message: SharedMessage, cancel: &CancellationToken) -> Result<(), BusError> {
        self.check_publishable(&message)?;
        let (completion, reply) = oneshot::channel();
        let envelope = Envelope::awaiting(message, completion, cancel.clone());
        self.enqueue(envelope, cancel).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BusError::Cancelled),
            outcome = reply => match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(BusError::Handler(err)),
                Err(_) => Err(BusError::DispatchAborted),
            },
        }
    }

    fn check_publishable(&self, message: &SharedMessage) -> Result<(), BusError> {
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        if message.slug().is_empty() {
            return Err(BusError::InvalidMessage("slug must not be empty".to_string()));
        }
        Ok(())
    }

    async fn enqueue(&self, envelope: Envelope, cancel: &CancellationToken) -> Result<(), BusError> {
        let slug = envelope.message.slug().to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BusError::Cancelled),
            sent = self.sender.send(envelope) => {
                // The loop closes the queue on shutdown.
                sent.map_err(|_| BusError::NotRunning)?;
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                debug!(slug = %slug, "Message enqueued");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.queue_capacity
    }

    #[must_use]
    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// Envelopes waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("state", &self.state())
            .field("capacity", &self.config.queue_capacity)
            .field("subscriptions", &self.registry.total())
            .finish()
    }
}

/// State owned by the dispatch loop.
struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
}

impl Dispatcher {
    async fn run(self, mut receiver: mpsc::Receiver<Envelope>) {
        debug!("Dispatch loop running");
        loop {
            tokio::select! {
                biased;
                next = receiver.recv() => match next {
                    Some(envelope) => self.dispatch(envelope).await,
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        // Refuse new envelopes, finish the ones already queued.
        receiver.close();
        let mut drained = 0usize;
        while let Some(envelope) = receiver.recv().await {
            self.dispatch(envelope).await;
            drained += 1;
        }
        debug!(drained, "Dispatch loop finished");
    }

    async fn dispatch(&self, envelope: Envelope) {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let handlers = self.registry.matching(envelope.message.as_ref());
        debug!(
            slug = envelope.message.slug(),
            category = envelope.message.category(),
            delivery = ?envelope.delivery,
            handlers = handlers.len(),
            "Dispatching message"
        );

        let ctx = HandlerContext::new(envelope.delivery, envelope.cancel, self.shutdown.clone());
        match envelope.delivery {
            Delivery::Sync => {
                let mut first_error: Option<HandlerError> = None;
                for handler in &handlers {
                    let result = invoke(handler.as_ref(), &ctx, Arc::clone(&envelope.message)).await;
                    if let Err(err) = result {
                        self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                        debug!(handler = handler.name(), error = %err, "Sync handler failed");
                        first_error.get_or_insert(err);
                    }
                }
                if let Some(completion) = envelope.completion {
                    let reply = first_error.map_or(Ok(()), Err);
                    if completion.send(reply).is_err() {
                        debug!(slug = envelope.message.slug(), "Publisher stopped waiting for reply");
                    }
                }
            }
            Delivery::Async => {
                for handler in handlers {
                    let ctx = ctx.clone();
                    let message = Arc::clone(&envelope.message);
                    let counters = Arc::clone(&self.counters);
                    self.tracker.spawn(async move {
                        if let Err(err) = invoke(handler.as_ref(), &ctx, message).await {
                            counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                            debug!(handler = handler.name(), error = %err, "Async handler failed");
                        }
                    });
                }
            }
        }
    }
}

/// Run one handler, turning a panic into a `HandlerError`.
async fn invoke(handler: &dyn MessageHandler, ctx: &HandlerContext, message: SharedMessage) -> HandlerResult {
    match AssertUnwindSafe(handler.handle(ctx, message)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            warn!(handler = handler.name(), "Handler panicked");
            Err(HandlerError::panicked(handler.name(), panic.as_ref()))
        }
    }
}
