// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus — typed pub/sub over in-process channels, with one global topic and a
//! private topic per agent.
//!
//! Publication never fails visibly. Subscription to an unknown topic
//! succeeds lazily (the topic is created on first publish or first
//! subscribe). Ordering is FIFO per topic, per subscriber; there is no
//! cross-topic ordering guarantee.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::warn;

use crate::event::{Event, EventKind};

/// Topic carrying bus-overflow warnings, per spec §4.1.
pub const OVERFLOW_TOPIC: &str = "bus.overflow";

/// Topic every agent and the scheduler publish committed turns on.
pub const GLOBAL_TOPIC: &str = "global";

/// Default per-subscriber queue depth before the oldest message is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct SubscriberQueue {
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }
}

#[derive(Default)]
struct Topic {
    subscribers: HashMap<u64, Arc<SubscriberQueue>>,
}

/// A live subscription returned by [`Bus::subscribe`]. Acts as a lazy,
/// unbounded sequence of messages — finite only once the bus closes it on
/// shutdown or [`Bus::unsubscribe`] is called for this handle.
pub struct Subscription {
    id: u64,
    topic: String,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Await the next message on this subscription, or `None` once closed
    /// and drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            {
                let mut buf = self.queue.buffer.lock().await;
                if let Some(msg) = buf.pop_front() {
                    return Some(msg);
                }
                if self.queue.closed.load(AtomicOrdering::Acquire) {
                    return None;
                }
            }
            self.queue.notify.notified().await;
        }
    }
}

pub struct Bus {
    topics: RwLock<HashMap<String, Topic>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Bus {
    pub fn new(queue_capacity: usize) -> Self {
        Self { topics: RwLock::new(HashMap::new()), next_id: AtomicU64::new(0), queue_capacity }
    }

    /// Register a subscriber on `topic`. The topic is created lazily.
    pub async fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(self.queue_capacity));

        let mut topics = self.topics.write().await;
        topics.entry(topic.clone()).or_default().subscribers.insert(id, Arc::clone(&queue));

        Subscription { id, topic, queue }
    }

    /// Remove a subscriber, closing its queue so in-flight `recv` calls
    /// return `None` once drained.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut topics = self.topics.write().await;
        if let Some(t) = topics.get_mut(&subscription.topic) {
            t.subscribers.remove(&subscription.id);
        }
        subscription.queue.closed.store(true, AtomicOrdering::Release);
        subscription.queue.notify.notify_waiters();
    }

    /// Publish `message` on `topic`. Non-blocking: if a subscriber's queue
    /// is full, the oldest message is dropped in favor of the new one and a
    /// warning is emitted on [`OVERFLOW_TOPIC`].
    pub async fn publish(&self, topic: &str, message: Event) {
        let mut overflowed: Vec<String> = Vec::new();
        {
            let topics = self.topics.read().await;
            if let Some(t) = topics.get(topic) {
                for queue in t.subscribers.values() {
                    let mut buf = queue.buffer.lock().await;
                    if buf.len() >= queue.capacity {
                        buf.pop_front();
                        overflowed.push(topic.to_owned());
                    }
                    buf.push_back(message.clone());
                    queue.notify.notify_one();
                }
            }
        }

        // Emit overflow warnings outside the topics read-lock, and never
        // recurse for the overflow topic itself (it would overflow forever
        // under sustained backpressure otherwise).
        if topic != OVERFLOW_TOPIC {
            for dropped_topic in overflowed {
                warn!(topic = %dropped_topic, "bus subscriber queue full, dropped oldest message");
                let warning = Event::new(
                    "bus",
                    message.timestamp,
                    message.seq,
                    EventKind::Error { detail: format!("overflow on topic {dropped_topic}") },
                );
                Box::pin(self.publish(OVERFLOW_TOPIC, warning)).await;
            }
        }
    }

    /// Number of live subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map(|t| t.subscribers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn turn(n: u64) -> Event {
        Event::new("A", n, n, EventKind::Turn { payload: format!("msg-{n}") })
    }

    #[tokio::test]
    async fn fifo_per_subscriber() {
        let bus = Bus::new(16);
        let sub = bus.subscribe(GLOBAL_TOPIC).await;
        bus.publish(GLOBAL_TOPIC, turn(1)).await;
        bus.publish(GLOBAL_TOPIC, turn(2)).await;

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn unknown_topic_subscribe_succeeds_lazily() {
        let bus = Bus::new(16);
        let sub = bus.subscribe("never-published").await;
        assert_eq!(bus.subscriber_count("never-published").await, 1);
        drop(sub);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_warns() {
        let bus = Bus::new(2);
        let sub = bus.subscribe(GLOBAL_TOPIC).await;
        let overflow_sub = bus.subscribe(OVERFLOW_TOPIC).await;

        bus.publish(GLOBAL_TOPIC, turn(1)).await;
        bus.publish(GLOBAL_TOPIC, turn(2)).await;
        bus.publish(GLOBAL_TOPIC, turn(3)).await; // queue capacity 2: drops seq 1

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.seq, 2);
        assert_eq!(second.seq, 3);

        let warning = overflow_sub.recv().await.unwrap();
        assert!(matches!(warning.kind, EventKind::Error { .. }));
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_queue() {
        let bus = Bus::new(16);
        let sub = bus.subscribe(GLOBAL_TOPIC).await;
        bus.unsubscribe(&sub).await;
        assert_eq!(bus.subscriber_count(GLOBAL_TOPIC).await, 0);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn cross_topic_isolation() {
        let bus = Bus::new(16);
        let global_sub = bus.subscribe(GLOBAL_TOPIC).await;
        let private_sub = bus.subscribe("agent:B").await;

        bus.publish(GLOBAL_TOPIC, turn(1)).await;

        assert!(private_sub.queue.buffer.lock().await.is_empty());
        assert_eq!(global_sub.recv().await.unwrap().seq, 1);
    }
}
