//! Task execution aggregate - the snapshot shape readers see.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::goal::TaskGoal;
use super::node::{ExecutionNode, NodeStatus};

/// Lifecycle status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Aggregate state of one task. The owning decision loop is the single
/// writer; everyone else receives deep-copied snapshots. Nodes are keyed
/// in a BTreeMap so snapshots serialize deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: String,
    pub goal: TaskGoal,
    #[serde(default)]
    pub nodes: BTreeMap<String, ExecutionNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskExecution {
    pub fn new(goal: TaskGoal) -> Self {
        Self {
            task_id: goal.task_id.clone(),
            goal,
            nodes: BTreeMap::new(),
            root_node_id: None,
            status: TaskStatus::Idle,
            started_at: None,
            finished_at: None,
        }
    }

    /// Count of nodes currently in a given status.
    pub fn count_status(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::DecisionAction;

    #[test]
    fn snapshot_round_trips_structurally() {
        let goal = TaskGoal::new("t-1", "navigate somewhere");
        let mut execution = TaskExecution::new(goal);
        let mut node = ExecutionNode::new("n1", DecisionAction::new("navigate_to"));
        node.status = NodeStatus::Success;
        node.resolved_output = Some("https://example.com/".to_string());
        execution.root_node_id = Some("n1".to_string());
        execution.nodes.insert("n1".to_string(), node);
        execution.status = TaskStatus::Running;
        execution.started_at = Some(chrono::Utc::now());

        let json = serde_json::to_string(&execution).unwrap();
        let back: TaskExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(execution, back);
    }

    #[test]
    fn status_counting() {
        let goal = TaskGoal::new("t-2", "x");
        let mut execution = TaskExecution::new(goal);
        assert_eq!(execution.count_status(NodeStatus::Success), 0);

        let mut ok = ExecutionNode::new("n1", DecisionAction::new("wait"));
        ok.status = NodeStatus::Success;
        execution.nodes.insert("n1".to_string(), ok);

        let mut bad = ExecutionNode::new("n2", DecisionAction::new("wait"));
        bad.status = NodeStatus::Failed;
        execution.nodes.insert("n2".to_string(), bad);

        assert_eq!(execution.count_status(NodeStatus::Success), 1);
        assert_eq!(execution.count_status(NodeStatus::Failed), 1);
    }
}
