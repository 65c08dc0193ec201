//! Canonical event protocol between the decision loop and its observers.
//!
//! `BusEvent` is the single source of truth for everything the loop
//! emits. Transports (WebSocket server, log stream, visualization) map
//! these to their own presentation; on the wire each event serializes as
//! `{"event": ..., "data": ...}`.

use serde::Serialize;

use crate::model::{ExecutionNode, LogEntry, TaskExecution};

/// Events fanned out per task through the event bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    /// A node changed; `data.node` is a full node snapshot.
    NodeUpdate { node: ExecutionNode },

    /// The task aggregate changed; `data.task` is a full snapshot.
    TaskUpdate { task: TaskExecution },

    /// One trace entry; `data` is the entry itself.
    Log(LogEntry),

    /// The browser moved to a new URL.
    BrowserUrl { url: String },
}

impl BusEvent {
    /// Terminal events are never dropped by the bus overflow policy.
    pub fn is_terminal(&self) -> bool {
        match self {
            BusEvent::NodeUpdate { node } => node.status.is_terminal(),
            BusEvent::TaskUpdate { task } => task.status.is_terminal(),
            BusEvent::Log(_) | BusEvent::BrowserUrl { .. } => false,
        }
    }

    /// Node id for node updates; used for same-node eviction.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            BusEvent::NodeUpdate { node } => Some(&node.node_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecisionAction, NodeStatus};

    #[test]
    fn wire_shape_is_event_plus_data() {
        let node = ExecutionNode::new("n1", DecisionAction::new("wait"));
        let json = serde_json::to_value(BusEvent::NodeUpdate { node }).unwrap();
        assert_eq!(json["event"], "node_update");
        assert_eq!(json["data"]["node"]["node_id"], "n1");

        let json = serde_json::to_value(BusEvent::BrowserUrl {
            url: "https://example.com".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "browser_url");
        assert_eq!(json["data"]["url"], "https://example.com");
    }

    #[test]
    fn terminality_follows_the_payload() {
        let mut node = ExecutionNode::new("n1", DecisionAction::new("wait"));
        assert!(!BusEvent::NodeUpdate { node: node.clone() }.is_terminal());
        node.status = NodeStatus::Success;
        assert!(BusEvent::NodeUpdate { node }.is_terminal());
    }
}
