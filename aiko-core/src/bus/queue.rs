//! Priority-ordered chat mailbox

use super::events::ChatMessage;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Priority score of a chat message, highest wins
///
/// Donations outrank subscriptions, which outrank moderators, which
/// outrank everyone else.
pub fn priority_score(msg: &ChatMessage) -> i64 {
    if msg.is_donation {
        // `as` saturates, so only the offset can overflow.
        return ((msg.donation_amount * 10.0).floor() as i64).saturating_add(1000);
    }
    if msg.is_sub {
        return i64::from(msg.sub_tier.max(1)) * 100;
    }
    if msg.is_moderator() {
        return 50;
    }
    1
}

/// A chat message together with its queue position
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    priority: i64,
    sequence: u64,
    message: ChatMessage,
}

impl QueuedMessage {
    /// Priority score assigned at enqueue time
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Arrival sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Borrow the message
    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    /// Take the message out
    pub fn into_message(self) -> ChatMessage {
        self.message
    }
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    // Max-heap: higher score first, then earlier arrival first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueInner {
    heap: Mutex<BinaryHeap<QueuedMessage>>,
    next_sequence: AtomicU64,
    available: Notify,
}

/// Unbounded priority queue of chat messages
///
/// Producers never block. Consumers suspend in [`get`](Self::get) until a
/// message is available. Messages of equal score come out in arrival order.
/// Nothing bounds the backlog: if the consumer stalls, low-priority chat
/// accumulates without limit.
#[derive(Clone)]
pub struct PriorityMessageQueue {
    inner: Arc<QueueInner>,
}

impl PriorityMessageQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                heap: Mutex::new(BinaryHeap::new()),
                next_sequence: AtomicU64::new(0),
                available: Notify::new(),
            }),
        }
    }

    /// Score and enqueue a message
    pub fn put(&self, msg: ChatMessage) {
        let priority = priority_score(&msg);
        let sequence = self.inner.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(
            "Queued message from {} (priority={}, seq={})",
            msg.username, priority, sequence
        );
        self.push(QueuedMessage {
            priority,
            sequence,
            message: msg,
        });
    }

    /// Put a previously dequeued message back at its original position
    pub fn requeue(&self, entry: QueuedMessage) {
        debug!(
            "Requeued message from {} (priority={}, seq={})",
            entry.message.username, entry.priority, entry.sequence
        );
        self.push(entry);
    }

    /// Wait for and remove the highest-priority message
    pub async fn get(&self) -> ChatMessage {
        self.get_entry().await.into_message()
    }

    /// Wait for and remove the highest-priority entry, keeping its position
    ///
    /// Cancel safe: dropping the future before it resolves never removes an
    /// entry.
    pub async fn get_entry(&self) -> QueuedMessage {
        loop {
            let notified = self.inner.available.notified();
            if let Some(entry) = self.try_pop() {
                return entry;
            }
            notified.await;
        }
    }

    /// Remove the highest-priority entry if one is present
    pub fn try_pop(&self) -> Option<QueuedMessage> {
        let mut heap = self.inner.heap.lock();
        let entry = heap.pop();
        if entry.is_some() && !heap.is_empty() {
            // Hand the wake-up on so other waiting consumers see the backlog.
            self.inner.available.notify_one();
        }
        entry
    }

    /// Point-in-time emptiness check
    ///
    /// Not a synchronization primitive: another task may push or pop right
    /// after this returns.
    pub fn is_empty(&self) -> bool {
        self.inner.heap.lock().is_empty()
    }

    /// Point-in-time number of queued messages
    pub fn len(&self) -> usize {
        self.inner.heap.lock().len()
    }

    fn push(&self, entry: QueuedMessage) {
        self.inner.heap.lock().push(entry);
        self.inner.available.notify_one();
    }
}

impl Default for PriorityMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
