//! Message bus connecting the orchestrator to its agents
//!
//! Each registered agent owns a priority queue and one worker task that
//! drains it. Delivery follows the message state machine in
//! [`message`]: Pending -> Processing -> Completed/Failed, with retryable
//! failures going back to Pending (after the configured backoff) until
//! `max_attempts` is exhausted.
//!
//! Senders never block on delivery: [`MessageBus::send`] enqueues and
//! returns a [`SendHandle`] whose [`outcome`](SendHandle::outcome) resolves
//! when the message reaches a terminal state.

pub mod error;
pub mod handler;
pub mod message;
mod queue;
mod stats;

pub use error::{BusError, HandlerError, HandlerErrorKind};
pub use handler::{AgentHandler, FnHandler, handler_fn};
pub use message::{Message, MessageKind, MessageStatus, Priority};
pub use stats::BusStats;

use crate::config::BusConfig;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use queue::{AgentQueue, QueuedMessage, ReplySlot};
use serde_json::Value;
use stats::BusCounters;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEAD_LETTER_CAPACITY: usize = 128;

pub type DeliveryResult = Result<Delivery, BusError>;

/// A completed request together with the agent's response
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The request in its final (Completed) state
    pub request: Message,
    /// Response correlated to `request`
    pub response: Message,
}

impl Delivery {
    pub fn value(&self) -> &Value {
        &self.response.payload
    }

    pub fn attempts(&self) -> u32 {
        self.request.attempt
    }
}

/// Handle to an in-flight message
#[derive(Debug)]
pub struct SendHandle {
    id: String,
    recipient: String,
    receiver: oneshot::Receiver<DeliveryResult>,
    reply: Arc<ReplySlot>,
}

impl SendHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Stop caring about this message. A message still queued is dropped
    /// without running; one already being processed runs to completion but
    /// its outcome is discarded.
    pub fn cancel(&self) {
        self.reply.cancel();
    }

    /// Wait for the terminal outcome
    pub async fn outcome(self) -> DeliveryResult {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) if self.reply.is_cancelled() => Err(BusError::Cancelled),
            Err(_) => Err(BusError::ShutDown),
        }
    }
}

struct AgentSlot {
    name: String,
    handler: Arc<dyn AgentHandler>,
    queue: AgentQueue,
    worker_spawned: AtomicBool,
}

struct BusInner {
    config: BusConfig,
    agents: DashMap<String, Arc<AgentSlot>>,
    counters: BusCounters,
    dead_letters: Mutex<VecDeque<Message>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Priority message bus with per-agent workers
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(BusInner {
                config,
                agents: DashMap::new(),
                counters: BusCounters::default(),
                dead_letters: Mutex::new(VecDeque::new()),
                shutdown_tx,
                started: AtomicBool::new(false),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `handler` under `name`. If the bus is already running the
    /// agent's worker starts right away.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl AgentHandler,
    ) -> Result<(), BusError> {
        self.register_arc(name, Arc::new(handler))
    }

    pub fn register_arc(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<(), BusError> {
        if self.is_shut_down() {
            return Err(BusError::ShutDown);
        }

        let name = name.into();
        let slot = match self.inner.agents.entry(name.clone()) {
            Entry::Occupied(_) => return Err(BusError::DuplicateAgent(name)),
            Entry::Vacant(vacant) => {
                let slot = Arc::new(AgentSlot {
                    name: name.clone(),
                    handler,
                    queue: AgentQueue::new(name.clone(), self.inner.config.queue_capacity),
                    worker_spawned: AtomicBool::new(false),
                });
                vacant.insert(slot.clone());
                slot
            }
        };

        info!(agent = %name, "agent registered");
        if self.inner.started.load(Ordering::SeqCst) {
            self.spawn_worker(slot);
        }
        Ok(())
    }

    /// Spawn one worker per registered agent. Must be called from within a
    /// Tokio runtime; calling it twice is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let slots: Vec<_> = self
            .inner
            .agents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        info!(agents = slots.len(), "message bus starting");
        for slot in slots {
            self.spawn_worker(slot);
        }
    }

    fn spawn_worker(&self, slot: Arc<AgentSlot>) {
        if slot.worker_spawned.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        let shutdown = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_worker(inner, slot, shutdown));
        self.inner.workers.lock().push(handle);
    }

    /// Enqueue `message` for its recipient
    pub fn send(&self, message: Message) -> Result<SendHandle, BusError> {
        if self.is_shut_down() {
            return Err(BusError::ShutDown);
        }
        let recipient = message
            .recipient
            .clone()
            .ok_or(BusError::MissingRecipient)?;
        self.enqueue(&recipient, message)
    }

    /// Send and wait for the outcome
    pub async fn request(&self, message: Message) -> DeliveryResult {
        self.send(message)?.outcome().await
    }

    /// Deliver one broadcast message to every registered agent except the
    /// sender and `exclude`. Each delivery stands on its own: a rejected
    /// agent does not undo the others.
    pub fn broadcast(
        &self,
        sender: &str,
        payload: Value,
        exclude: &[&str],
    ) -> Vec<(String, Result<SendHandle, BusError>)> {
        if self.is_shut_down() {
            return Vec::new();
        }

        let mut targets: Vec<String> = self
            .inner
            .agents
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| name != sender && !exclude.contains(&name.as_str()))
            .collect();
        targets.sort();

        debug!(sender, recipients = targets.len(), "broadcasting");
        targets
            .into_iter()
            .map(|agent| {
                let message = Message::broadcast(sender, payload.clone());
                let outcome = self.enqueue(&agent, message);
                (agent, outcome)
            })
            .collect()
    }

    fn enqueue(&self, agent: &str, message: Message) -> Result<SendHandle, BusError> {
        let slot = self
            .inner
            .agents
            .get(agent)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BusError::UnknownAgent(agent.to_string()))?;

        if message.status != MessageStatus::Pending || !message.can_retry() {
            return Err(BusError::InvalidTransition {
                id: message.id.clone(),
                from: message.status,
                to: MessageStatus::Processing,
            });
        }

        let (reply, receiver) = ReplySlot::new();
        let id = message.id.clone();
        let priority = message.priority.value();
        if let Err(err) = slot.queue.push(message, reply.clone()) {
            self.inner.counters.record_rejected();
            warn!(agent, id = %id, "rejecting message: {}", err);
            return Err(err);
        }

        self.inner.counters.record_sent();
        debug!(agent, id = %id, priority, "message enqueued");
        Ok(SendHandle {
            id,
            recipient: agent.to_string(),
            receiver,
            reply,
        })
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.agents.contains_key(name)
    }

    /// Registered agent names, sorted
    pub fn agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .agents
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of the running counters. Never waits on delivery.
    pub fn stats(&self) -> BusStats {
        let queue_depths: BTreeMap<String, usize> = self
            .inner
            .agents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().queue.len()))
            .collect();
        self.inner
            .counters
            .snapshot(queue_depths.len(), queue_depths)
    }

    /// Error messages for the most recent permanently failed deliveries
    pub fn dead_letters(&self) -> Vec<Message> {
        self.inner.dead_letters.lock().iter().cloned().collect()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Stop all workers, fail queued messages with [`BusError::ShutDown`]
    /// and drop every registration.
    pub async fn shutdown(&self) {
        if self.inner.shutdown_tx.send_replace(true) {
            return;
        }

        let grace = Duration::from_millis(self.inner.config.shutdown_grace_ms);
        let handles = std::mem::take(&mut *self.inner.workers.lock());
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("agent worker did not stop within {}ms, aborting", grace.as_millis());
                abort.abort();
            }
        }

        let slots: Vec<_> = self
            .inner
            .agents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.inner.agents.clear();

        let mut abandoned = 0usize;
        for slot in slots {
            for queued in slot.queue.drain() {
                abandoned += 1;
                queued.reply.notify(Err(BusError::ShutDown));
            }
        }
        info!(abandoned, "message bus shut down");
    }
}

async fn run_worker(
    inner: Arc<BusInner>,
    slot: Arc<AgentSlot>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(agent = %slot.name, "worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(queued) = slot.queue.pop() else {
            tokio::select! {
                _ = slot.queue.ready() => continue,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        };
        inner.deliver(&slot, queued).await;
    }
    debug!(agent = %slot.name, "worker stopped");
}

impl BusInner {
    async fn deliver(self: &Arc<Self>, slot: &Arc<AgentSlot>, queued: QueuedMessage) {
        let QueuedMessage {
            mut message, reply, ..
        } = queued;

        if reply.is_cancelled() {
            self.counters.record_cancelled();
            debug!(agent = %slot.name, id = %message.id, "dropping cancelled message");
            reply.notify(Err(BusError::Cancelled));
            return;
        }

        if let Err(err) = message.begin_processing() {
            self.counters.record_failed();
            warn!(agent = %slot.name, id = %message.id, "cannot deliver: {}", err);
            reply.notify(Err(err));
            return;
        }

        let attempt = message.attempt;
        debug!(
            agent = %slot.name,
            id = %message.id,
            attempt,
            max_attempts = message.max_attempts,
            "delivering"
        );

        // The handler runs on its own task: a deadline abandons the result
        // without interrupting the handler.
        let handler = slot.handler.clone();
        let input = message.clone();
        let task = tokio::spawn(async move { handler.handle(input).await });

        let failure = match tokio::time::timeout(message.timeout(), task).await {
            Ok(Ok(Ok(value))) => {
                self.complete(slot, message, reply, value);
                return;
            }
            Ok(Ok(Err(cause))) => BusError::Handler {
                agent: slot.name.clone(),
                attempts: attempt,
                cause,
            },
            Ok(Err(join_error)) => BusError::Handler {
                agent: slot.name.clone(),
                attempts: attempt,
                cause: HandlerError::new(format!("handler panicked: {}", join_error)),
            },
            Err(_) => {
                self.counters.record_timeout();
                BusError::Timeout {
                    agent: slot.name.clone(),
                    timeout_ms: message.timeout_ms,
                    attempts: attempt,
                }
            }
        };

        self.retry_or_fail(slot, message, reply, failure);
    }

    fn complete(&self, slot: &AgentSlot, mut message: Message, reply: Arc<ReplySlot>, value: Value) {
        if let Err(err) = message.complete() {
            self.counters.record_failed();
            reply.notify(Err(err));
            return;
        }

        let latency = message.latency().unwrap_or_default();
        self.counters.record_completed(latency);
        debug!(
            agent = %slot.name,
            id = %message.id,
            latency_ms = latency.as_millis() as u64,
            "delivery completed"
        );

        let response = Message::response_to(&message, value);
        if !reply.notify(Ok(Delivery {
            request: message,
            response,
        })) {
            debug!(agent = %slot.name, "completion notification suppressed");
        }
    }

    fn retry_or_fail(
        self: &Arc<Self>,
        slot: &Arc<AgentSlot>,
        mut message: Message,
        reply: Arc<ReplySlot>,
        failure: BusError,
    ) {
        if failure.is_retryable()
            && message.can_retry()
            && !reply.is_cancelled()
            && message.requeue().is_ok()
        {
            self.counters.record_retry();
            let delay = self.config.retry.delay_for(message.attempt);
            warn!(
                agent = %slot.name,
                id = %message.id,
                attempt = message.attempt,
                max_attempts = message.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "delivery failed, retrying: {}",
                failure
            );
            self.schedule_retry(slot.clone(), message, reply, delay);
            return;
        }

        if let Err(err) = message.fail() {
            warn!(
                agent = %slot.name,
                id = %message.id,
                "could not mark message failed: {}",
                err
            );
        }
        self.counters.record_failed();
        warn!(
            agent = %slot.name,
            id = %message.id,
            attempts = message.attempt,
            "delivery failed: {}",
            failure
        );

        {
            let mut dead_letters = self.dead_letters.lock();
            if dead_letters.len() >= DEAD_LETTER_CAPACITY {
                dead_letters.pop_front();
            }
            dead_letters.push_back(Message::error_for(&message, failure.to_string()));
        }
        reply.notify(Err(failure));
    }

    fn schedule_retry(
        &self,
        slot: Arc<AgentSlot>,
        message: Message,
        reply: Arc<ReplySlot>,
        delay: Duration,
    ) {
        if delay.is_zero() {
            slot.queue.requeue(message, reply);
            return;
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                reply.notify(Err(BusError::ShutDown));
                return;
            }
            slot.queue.requeue(message, reply);
        });
    }
}
