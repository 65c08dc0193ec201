//! Decision actions - single tool-invocation directives planned by the LM.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hard cap on `max_attempts`; the validator rejects anything above.
pub const MAX_ATTEMPTS_CEILING: u32 = 5;

/// What the loop does when an action fails after exhausting its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnFailure {
    /// Ask the planner for a correction subplan grafted under the node.
    #[default]
    ReEvaluate,
    /// Prune all descendants and stop pursuing this branch.
    Abort,
    /// Mark descendants SKIPPED and continue with the rest of the graph.
    Skip,
    /// The in-dispatcher retries were the only recovery; give up.
    RetryOnly,
}

/// A single invocation directive. Arguments are a string-keyed bag for
/// flexibility; every access goes through the tool's parameter schema at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAction {
    /// Must appear in `TaskGoal.allowed_actions`.
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub max_attempts: u32,
    pub execution_timeout_seconds: u64,
    /// Post-action wait predicate, e.g. "networkidle" or "selector:#content".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_condition_after: Option<String>,
    /// The model's stated reasoning for this step.
    #[serde(default)]
    pub reasoning: String,
    /// Model confidence in [0, 1].
    pub confidence_score: f64,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub on_failure: OnFailure,
}

impl DecisionAction {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
            max_attempts: 1,
            execution_timeout_seconds: 30,
            wait_for_condition_after: None,
            reasoning: String::new(),
            confidence_score: 1.0,
            expected_outcome: String::new(),
            on_failure: OnFailure::default(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.arguments.insert(key.to_string(), value);
        self
    }
}
