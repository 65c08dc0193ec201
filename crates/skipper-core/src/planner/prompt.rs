//! Prompt assembly for the planner.
//!
//! The per-tool parameter guide is configuration, not code: one line per
//! tool, emitted only for the tools the goal actually allows.

use serde_json::Value;

use crate::model::{ExecutionNode, TaskGoal, WebObservation};

/// One-line parameter guide per known tool.
pub const TOOL_GUIDE: &[(&str, &str)] = &[
    ("navigate_to", "args: {url: full URL string}"),
    ("click_element", "args: {xpath: XPath of the element to click}"),
    ("click_nth", "args: {selector: CSS selector, index: 0-based match index}"),
    (
        "type_text",
        "args: {xpath: target element, text: what to type, press_enter?: bool}",
    ),
    (
        "scroll",
        "args: {direction: up|down|top|bottom, amount?: pixels for up/down}",
    ),
    ("wait", "args: {seconds: number of seconds to pause}"),
    (
        "wait_for",
        "args: {condition: 'networkidle' or 'selector:<css>'}",
    ),
    (
        "extract_data",
        "args: {selector?: CSS selector, attribute: text|href|value, limit?: max items}",
    ),
    (
        "get_element_attribute",
        "args: {xpath: target element, attribute: attribute name}",
    ),
    (
        "take_screenshot",
        "args: {task_topic: short label for the filename, full_page?: bool}",
    ),
    (
        "find_link_by_text",
        "args: {keyword: visible link text to match, limit?: max links}",
    ),
    (
        "open_notepad",
        "args: {file_path?: where to write, initial_content: text to save}",
    ),
];

fn guide_for(tool: &str) -> &'static str {
    TOOL_GUIDE
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, guide)| *guide)
        .unwrap_or("args: {}")
}

/// System prompt shared by `plan` and `correct`.
pub fn system_prompt(goal: &TaskGoal, node_schema: &Value) -> String {
    let mut tools = String::new();
    for name in &goal.allowed_actions {
        tools.push_str(&format!("- {name}: {}\n", guide_for(name)));
    }

    format!(
        "You are {persona}, a web-automation planner working in a {env} browser.\n\
         \n\
         Goal: {goal}\n\
         \n\
         Plan the goal as a tree of discrete tool invocations. Allowed tools:\n\
         {tools}\n\
         Each step must be one JSON object matching this schema:\n\
         {schema}\n\
         \n\
         Respond with exactly one JSON object of the form\n\
         {{\"execution_plan\": [node, node, ...]}}\n\
         and nothing else. Steps without a parent_id hang off the insertion \
         anchor. Later steps may reference earlier outputs as \
         ${{node_id.output}} in string arguments.",
        persona = goal.agent_persona,
        env = goal.environment,
        goal = goal.description,
        tools = tools,
        schema = node_schema,
    )
}

/// User message for an initial plan.
pub fn plan_message(observation: Option<&WebObservation>, context: &str) -> String {
    let mut out = String::from("Produce the initial execution plan for the goal.\n");
    push_situation(&mut out, observation, context);
    out
}

/// User message for a correction subplan under a failed node.
pub fn correction_message(
    failed: &ExecutionNode,
    observation: Option<&WebObservation>,
    context: &str,
) -> String {
    let feedback = failed
        .observation
        .as_ref()
        .and_then(|o| o.action_feedback.as_ref());
    let mut out = format!(
        "Step '{id}' ({tool}) failed: {reason}.\n",
        id = failed.node_id,
        tool = failed.action.tool_name,
        reason = failed.failure_reason.as_deref().unwrap_or("no reason recorded"),
    );
    if let Some(fb) = feedback {
        out.push_str(&format!(
            "Last feedback: {:?} {} \"{}\"\n",
            fb.status,
            fb.error_code.as_deref().unwrap_or("-"),
            fb.message
        ));
    }
    out.push_str(
        "Produce a short correction subplan that recovers from this failure. \
         It will be grafted under the failed step and run before the \
         original continuation.\n",
    );
    push_situation(&mut out, observation, context);
    out
}

fn push_situation(out: &mut String, observation: Option<&WebObservation>, context: &str) {
    match observation {
        Some(obs) => out.push_str(&format!("Current page: {}\n", obs.summary())),
        None => out.push_str("Current page: none (browser not yet driven)\n"),
    }
    if !context.is_empty() {
        out.push_str(&format!("Memory context: {context}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema;

    #[test]
    fn system_prompt_lists_only_allowed_tools() {
        let mut goal = TaskGoal::new("t", "grab the headlines");
        goal.allowed_actions = vec!["navigate_to".into(), "extract_data".into()];
        let prompt = system_prompt(&goal, &schema::execution_node_schema());
        assert!(prompt.contains("- navigate_to:"));
        assert!(prompt.contains("- extract_data:"));
        assert!(!prompt.contains("- take_screenshot:"));
        assert!(prompt.contains("execution_plan"));
    }

    #[test]
    fn correction_message_carries_the_failure() {
        let mut node = ExecutionNode::new(
            "n3",
            crate::model::DecisionAction::new("extract_data"),
        );
        node.failure_reason = Some("stale DOM".to_string());
        let msg = correction_message(&node, None, "");
        assert!(msg.contains("n3"));
        assert!(msg.contains("stale DOM"));
    }
}
