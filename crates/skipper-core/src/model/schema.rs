//! JSON-schema export for the shapes the language model must emit.

use serde_json::{json, Value};

/// Schema of one `ExecutionNode` as the planner hands it to the model.
///
/// Runtime-only fields (status, child list, observation, resolved output)
/// are deliberately absent: the model plans, the loop executes.
pub fn execution_node_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "node_id": {
                "type": "string",
                "description": "Unique id for this step, e.g. 'n1'"
            },
            "parent_id": {
                "type": ["string", "null"],
                "description": "Id of the step this one depends on; omit for the anchor"
            },
            "priority": {
                "type": "integer",
                "description": "Lower runs earlier among siblings"
            },
            "required_precondition": {
                "type": ["string", "null"],
                "description": "Optional expression referencing prior outputs as ${node_id.output}"
            },
            "expected_cost": {
                "type": "integer",
                "minimum": 0
            },
            "action": decision_action_schema(),
        },
        "required": ["node_id", "priority", "action"],
        "additionalProperties": false
    })
}

/// Schema of the action payload inside a node.
pub fn decision_action_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tool_name": {
                "type": "string",
                "description": "One of the allowed tools listed in the prompt"
            },
            "arguments": {
                "type": "object",
                "description": "Tool arguments; values may embed ${node_id.output} templates"
            },
            "max_attempts": {
                "type": "integer",
                "minimum": 1,
                "maximum": 5
            },
            "execution_timeout_seconds": {
                "type": "integer",
                "minimum": 1
            },
            "wait_for_condition_after": {
                "type": ["string", "null"],
                "description": "e.g. 'networkidle' or 'selector:#content'"
            },
            "reasoning": { "type": "string" },
            "confidence_score": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "expected_outcome": { "type": "string" },
            "on_failure": {
                "type": "string",
                "enum": ["RE_EVALUATE", "ABORT", "SKIP", "RETRY_ONLY"]
            }
        },
        "required": [
            "tool_name",
            "arguments",
            "max_attempts",
            "execution_timeout_seconds",
            "confidence_score"
        ],
        "additionalProperties": false
    })
}
