//! Event bus - per-task fan-out of loop events to subscribers.
//!
//! Delivery is best-effort and FIFO per (task, subscriber). Each
//! subscriber owns a bounded queue; on overflow the oldest non-terminal
//! `node_update` for the same node is evicted first, then any
//! non-terminal `node_update`, then the incoming event itself is dropped
//! if non-terminal. Terminal events are never dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::loop_events::BusEvent;

/// Bounded queue size per subscriber.
pub const SUBSCRIBER_QUEUE_CAP: usize = 256;

struct SubscriberInner {
    queue: Mutex<VecDeque<BusEvent>>,
    notify: Notify,
    closed: AtomicBool,
    cap: usize,
}

impl SubscriberInner {
    fn push(&self, event: BusEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.cap && !evict_one(&mut queue, &event) && !event.is_terminal() {
            tracing::debug!("Subscriber queue full, dropping non-terminal event");
            return;
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

/// Remove the best eviction candidate; true if one was removed.
fn evict_one(queue: &mut VecDeque<BusEvent>, incoming: &BusEvent) -> bool {
    // First choice: oldest non-terminal node_update for the same node.
    if let Some(node_id) = incoming.node_id() {
        if let Some(pos) = queue
            .iter()
            .position(|e| !e.is_terminal() && e.node_id() == Some(node_id))
        {
            queue.remove(pos);
            return true;
        }
    }
    // Fallback: oldest non-terminal node_update of any node.
    if let Some(pos) = queue
        .iter()
        .position(|e| !e.is_terminal() && e.node_id().is_some())
    {
        queue.remove(pos);
        return true;
    }
    false
}

/// A live subscription. Dropping it unsubscribes lazily (the bus prunes
/// closed subscribers on the next publish).
pub struct Subscription {
    inner: Arc<SubscriberInner>,
}

impl Subscription {
    /// Receive the next event, waiting if the queue is empty.
    pub async fn recv(&self) -> BusEvent {
        loop {
            if let Some(event) = self.inner.queue.lock().pop_front() {
                return event;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<BusEvent> {
        self.inner.queue.lock().pop_front()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

/// Fan-out of state transitions, keyed by task id.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<String, Vec<Arc<SubscriberInner>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, task_id: &str) -> Subscription {
        let inner = Arc::new(SubscriberInner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            cap: SUBSCRIBER_QUEUE_CAP,
        });
        self.subscribers
            .entry(task_id.to_string())
            .or_default()
            .push(inner.clone());
        Subscription { inner }
    }

    /// Publish one event to every live subscriber of `task_id`.
    pub fn publish(&self, task_id: &str, event: BusEvent) {
        let Some(mut subs) = self.subscribers.get_mut(task_id) else {
            return;
        };
        subs.retain(|s| !s.closed.load(Ordering::SeqCst));
        for sub in subs.iter() {
            sub.push(event.clone());
        }
    }

    /// Drop every subscriber for a task (used after final delivery).
    pub fn clear_task(&self, task_id: &str) {
        self.subscribers.remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecisionAction, ExecutionNode, NodeStatus};

    fn node_event(id: &str, status: NodeStatus) -> BusEvent {
        let mut node = ExecutionNode::new(id, DecisionAction::new("wait"));
        node.status = status;
        BusEvent::NodeUpdate { node }
    }

    fn url_event(url: &str) -> BusEvent {
        BusEvent::BrowserUrl {
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t1");
        bus.publish("t1", url_event("a"));
        bus.publish("t1", url_event("b"));

        assert!(matches!(sub.recv().await, BusEvent::BrowserUrl { url } if url == "a"));
        assert!(matches!(sub.recv().await, BusEvent::BrowserUrl { url } if url == "b"));
    }

    #[tokio::test]
    async fn tasks_are_isolated() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t1");
        bus.publish("t2", url_event("other"));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn overflow_evicts_same_node_non_terminal_first() {
        let inner = Arc::new(SubscriberInner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            cap: 3,
        });
        inner.push(node_event("a", NodeStatus::Pending));
        inner.push(node_event("b", NodeStatus::Pending));
        inner.push(node_event("a", NodeStatus::Running));
        // Full. Another update for "a" evicts the oldest "a" entry.
        inner.push(node_event("a", NodeStatus::Success));

        let queue = inner.queue.lock();
        assert_eq!(queue.len(), 3);
        let ids: Vec<_> = queue.iter().map(|e| e.node_id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["b", "a", "a"]);
    }

    #[test]
    fn terminal_events_are_never_dropped() {
        let inner = Arc::new(SubscriberInner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            cap: 2,
        });
        // Fill with non-evictable events (no node ids).
        inner.push(url_event("a"));
        inner.push(url_event("b"));

        // Non-terminal overflow is dropped...
        inner.push(url_event("c"));
        assert_eq!(inner.queue.lock().len(), 2);

        // ...but a terminal event goes through even beyond the cap.
        inner.push(node_event("done", NodeStatus::Success));
        assert_eq!(inner.queue.lock().len(), 3);
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t1");
        drop(sub);
        bus.publish("t1", url_event("a"));
        assert!(bus.subscribers.get("t1").unwrap().is_empty());
    }
}
