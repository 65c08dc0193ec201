//! Validation of planner output and task goals.
//!
//! Models are plain values; validation is a separate pass so the planner
//! can report the exact field path back to the language model.

use std::collections::HashSet;

use thiserror::Error;

use super::action::{DecisionAction, MAX_ATTEMPTS_CEILING};
use super::goal::TaskGoal;
use super::node::ExecutionNode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed at {path}: {reason}")]
pub struct ValidationError {
    /// Dotted field path, e.g. `action.confidence_score`.
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Validate a goal before a loop is spawned for it.
pub fn goal(goal: &TaskGoal) -> Result<(), ValidationError> {
    if goal.task_id.is_empty() {
        return Err(ValidationError::new("task_id", "must not be empty"));
    }
    if goal.description.trim().is_empty() {
        return Err(ValidationError::new("description", "must not be empty"));
    }
    if goal.max_execution_time_seconds == 0 {
        return Err(ValidationError::new(
            "max_execution_time_seconds",
            "must be a positive number of seconds",
        ));
    }
    if goal.allowed_actions.is_empty() {
        return Err(ValidationError::new(
            "allowed_actions",
            "must name at least one tool",
        ));
    }
    let mut seen = HashSet::new();
    for (i, name) in goal.allowed_actions.iter().enumerate() {
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::new(
                format!("allowed_actions[{i}]"),
                format!("duplicate tool '{name}'"),
            ));
        }
    }
    if !(1..=10).contains(&goal.priority) {
        return Err(ValidationError::new(
            "priority",
            "must be between 1 (highest) and 10 (lowest)",
        ));
    }
    Ok(())
}

/// Validate one planned node against the goal it will execute under.
pub fn node(node: &ExecutionNode, goal: &TaskGoal) -> Result<(), ValidationError> {
    if node.node_id.trim().is_empty() {
        return Err(ValidationError::new("node_id", "must not be empty"));
    }
    action(&node.action, goal).map_err(|e| ValidationError {
        path: format!("action.{}", e.path),
        reason: e.reason,
    })
}

fn action(action: &DecisionAction, goal: &TaskGoal) -> Result<(), ValidationError> {
    if !goal.allows(&action.tool_name) {
        return Err(ValidationError::new(
            "tool_name",
            format!(
                "'{}' is not in the allowed tool list [{}]",
                action.tool_name,
                goal.allowed_actions.join(", ")
            ),
        ));
    }
    if action.max_attempts == 0 || action.max_attempts > MAX_ATTEMPTS_CEILING {
        return Err(ValidationError::new(
            "max_attempts",
            format!("must be between 1 and {MAX_ATTEMPTS_CEILING}"),
        ));
    }
    if action.execution_timeout_seconds == 0 {
        return Err(ValidationError::new(
            "execution_timeout_seconds",
            "must be a positive number of seconds",
        ));
    }
    if !(0.0..=1.0).contains(&action.confidence_score) || action.confidence_score.is_nan() {
        return Err(ValidationError::new(
            "confidence_score",
            "must be within [0, 1]",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_goal() -> TaskGoal {
        TaskGoal::new("t-1", "collect headlines")
    }

    fn test_node(tool: &str) -> ExecutionNode {
        let action = DecisionAction::new(tool).with_arg("url", json!("https://example.com"));
        ExecutionNode::new("n1", action)
    }

    #[test]
    fn accepts_a_well_formed_node() {
        assert!(node(&test_node("navigate_to"), &test_goal()).is_ok());
    }

    #[test]
    fn rejects_unknown_tool() {
        let err = node(&test_node("rm_rf"), &test_goal()).unwrap_err();
        assert_eq!(err.path, "action.tool_name");
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let mut n = test_node("navigate_to");
        n.action.confidence_score = 1.2;
        let err = node(&n, &test_goal()).unwrap_err();
        assert_eq!(err.path, "action.confidence_score");
    }

    #[test]
    fn rejects_non_positive_timeout_and_bad_attempts() {
        let mut n = test_node("navigate_to");
        n.action.execution_timeout_seconds = 0;
        assert!(node(&n, &test_goal()).is_err());

        let mut n = test_node("navigate_to");
        n.action.max_attempts = 6;
        assert!(node(&n, &test_goal()).is_err());
    }

    #[test]
    fn rejects_duplicate_allowed_actions() {
        let mut g = test_goal();
        g.allowed_actions.push("navigate_to".to_string());
        let err = goal(&g).unwrap_err();
        assert!(err.reason.contains("duplicate"));
    }

    #[test]
    fn rejects_goal_priority_out_of_band() {
        let mut g = test_goal();
        g.priority = 0;
        assert!(goal(&g).is_err());
        g.priority = 11;
        assert!(goal(&g).is_err());
    }
}
