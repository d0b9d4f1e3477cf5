//! Per-agent priority queue

use super::error::BusError;
use super::message::Message;
use super::{Delivery, DeliveryResult};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::{Notify, oneshot};

/// Where a message's outcome is reported
#[derive(Debug)]
pub(crate) struct ReplySlot {
    sender: Mutex<Option<oneshot::Sender<DeliveryResult>>>,
    cancelled: AtomicBool,
}

impl ReplySlot {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<DeliveryResult>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            cancelled: AtomicBool::new(false),
        });
        (slot, rx)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }

    /// Deliver the outcome once. Returns false if the notification was
    /// suppressed by cancellation or nobody is listening anymore.
    pub(crate) fn notify(&self, outcome: Result<Delivery, BusError>) -> bool {
        if self.is_cancelled() {
            self.sender.lock().take();
            return false;
        }
        match self.sender.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct QueuedMessage {
    pub(crate) message: Message,
    pub(crate) reply: Arc<ReplySlot>,
    seq: u64,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    // BinaryHeap pops the greatest element, so "greater" means "deliver first":
    // lower priority number, then older created_at, then earlier submission.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .message
            .priority
            .cmp(&self.message.priority)
            .then_with(|| other.message.created_at.cmp(&self.message.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue feeding one agent's worker
#[derive(Debug)]
pub(crate) struct AgentQueue {
    agent: String,
    heap: Mutex<BinaryHeap<QueuedMessage>>,
    ready: Notify,
    capacity: usize,
    seq: AtomicU64,
}

impl AgentQueue {
    pub(crate) fn new(agent: impl Into<String>, capacity: usize) -> Self {
        Self {
            agent: agent.into(),
            heap: Mutex::new(BinaryHeap::new()),
            ready: Notify::new(),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// Admit a new message, rejecting when the queue is at capacity
    pub(crate) fn push(&self, message: Message, reply: Arc<ReplySlot>) -> Result<(), BusError> {
        {
            let mut heap = self.heap.lock();
            if heap.len() >= self.capacity {
                return Err(BusError::QueueFull {
                    agent: self.agent.clone(),
                    capacity: self.capacity,
                });
            }
            heap.push(self.wrap(message, reply));
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Put back a message that was already admitted; ignores capacity
    pub(crate) fn requeue(&self, message: Message, reply: Arc<ReplySlot>) {
        self.heap.lock().push(self.wrap(message, reply));
        self.ready.notify_one();
    }

    pub(crate) fn pop(&self) -> Option<QueuedMessage> {
        self.heap.lock().pop()
    }

    /// Wait until something may have been pushed
    pub(crate) async fn ready(&self) {
        self.ready.notified().await
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub(crate) fn drain(&self) -> Vec<QueuedMessage> {
        self.heap.lock().drain().collect()
    }

    fn wrap(&self, message: Message, reply: Arc<ReplySlot>) -> QueuedMessage {
        QueuedMessage {
            message,
            reply,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
        }
    }
}
