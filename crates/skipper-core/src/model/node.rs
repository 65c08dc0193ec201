//! Execution nodes - the vertices of the dynamic execution graph.

use serde::{Deserialize, Serialize};

use super::action::DecisionAction;
use super::observation::WebObservation;

/// Lifecycle status of one node.
///
/// PENDING -> RUNNING -> SUCCESS | FAILED; PRUNED and SKIPPED are
/// assigned without passing through RUNNING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Pruned,
    Skipped,
}

impl NodeStatus {
    /// True once the node can never run again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Success | NodeStatus::Failed | NodeStatus::Pruned | NodeStatus::Skipped
        )
    }
}

/// A vertex of the DEG. Child order is maintained by the graph
/// (ascending priority, insertion order on ties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    /// Lower runs earlier among siblings.
    pub priority: i64,
    pub action: DecisionAction,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// May reference prior nodes' outputs as `${node_id.field}`; the node
    /// is not runnable until every reference resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_precondition: Option<String>,
    /// Planning hint, not enforced.
    #[serde(default)]
    pub expected_cost: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<WebObservation>,
    /// String projection of what the node produced; set exactly once, on
    /// SUCCESS, and immutable thereafter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_output: Option<String>,
}

impl ExecutionNode {
    pub fn new(node_id: impl Into<String>, action: DecisionAction) -> Self {
        Self {
            node_id: node_id.into(),
            parent_id: None,
            child_ids: Vec::new(),
            priority: 1,
            action,
            status: NodeStatus::Pending,
            failure_reason: None,
            required_precondition: None,
            expected_cost: 0,
            observation: None,
            resolved_output: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}
