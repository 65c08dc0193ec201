//! Task goal - the immutable record describing one submitted task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default per-step time budget in seconds.
pub const DEFAULT_STEP_BUDGET_SECS: u64 = 60;

/// Tools every task may use unless the caller narrows the list.
pub const DEFAULT_ALLOWED_ACTIONS: &[&str] = &[
    "navigate_to",
    "click_element",
    "click_nth",
    "type_text",
    "scroll",
    "wait",
    "wait_for",
    "extract_data",
    "get_element_attribute",
    "take_screenshot",
    "find_link_by_text",
    "open_notepad",
];

/// One submitted task. Built by the task registry and never mutated
/// afterwards; the decision loop only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGoal {
    /// Globally unique opaque identifier.
    pub task_id: String,
    /// Human-facing target description.
    pub description: String,
    /// Optional hard deadline (UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Per-step time budget in seconds. Also feeds the wall-clock bound.
    pub max_execution_time_seconds: u64,
    /// Credentials or parameters the task needs (never logged).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub required_data: HashMap<String, String>,
    /// Agent persona tag forwarded to the planner prompt.
    pub agent_persona: String,
    /// Execution-environment tag (e.g. "headless", "headed").
    pub environment: String,
    /// Ordered list of tool names the planner may schedule.
    pub allowed_actions: Vec<String>,
    /// 1 = highest .. 10 = lowest.
    pub priority: u8,
}

impl TaskGoal {
    /// Build a goal with defaults for everything but the id/description.
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            deadline: None,
            max_execution_time_seconds: DEFAULT_STEP_BUDGET_SECS,
            required_data: HashMap::new(),
            agent_persona: "web_navigator".to_string(),
            environment: "headless".to_string(),
            allowed_actions: DEFAULT_ALLOWED_ACTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            priority: 5,
        }
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_actions.iter().any(|t| t == tool_name)
    }
}
