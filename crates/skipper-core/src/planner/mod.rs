//! Planner - turns a goal plus the latest observation into validated
//! execution nodes by calling the language-model capability.
//!
//! The model gets exactly one second chance: a validation failure is fed
//! back verbatim as a clarification, and a second failure is surfaced as
//! `PlannerError`.

pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{LmError, PlannerError};
use crate::lm::{LanguageModel, PlanRequest, DEFAULT_CALL_BUDGET_SECS};
use crate::model::{schema, validate, ExecutionNode, TaskGoal, WebObservation};

pub struct Planner {
    lm: Arc<dyn LanguageModel>,
    call_budget: Duration,
}

impl Planner {
    pub fn new(lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            lm,
            call_budget: Duration::from_secs(DEFAULT_CALL_BUDGET_SECS),
        }
    }

    pub fn with_call_budget(mut self, budget: Duration) -> Self {
        self.call_budget = budget;
        self
    }

    /// One model call under the per-call budget.
    async fn complete(&self, request: PlanRequest) -> Result<Value, PlannerError> {
        tokio::time::timeout(self.call_budget, self.lm.complete(request))
            .await
            .map_err(|_| PlannerError::Lm(LmError::Timeout(self.call_budget.as_secs())))?
            .map_err(PlannerError::Lm)
    }

    /// Initial plan for a goal.
    pub async fn plan(
        &self,
        goal: &TaskGoal,
        observation: Option<&WebObservation>,
        context: &str,
    ) -> Result<Vec<ExecutionNode>, PlannerError> {
        let user = prompt::plan_message(observation, context);
        self.request(goal, user).await
    }

    /// Correction subplan for a failed node.
    pub async fn correct(
        &self,
        goal: &TaskGoal,
        observation: Option<&WebObservation>,
        failed: &ExecutionNode,
        context: &str,
    ) -> Result<Vec<ExecutionNode>, PlannerError> {
        let user = prompt::correction_message(failed, observation, context);
        self.request(goal, user).await
    }

    async fn request(
        &self,
        goal: &TaskGoal,
        user_message: String,
    ) -> Result<Vec<ExecutionNode>, PlannerError> {
        let node_schema = schema::execution_node_schema();
        let system = prompt::system_prompt(goal, &node_schema);

        let first = self
            .complete(PlanRequest {
                system_prompt: system.clone(),
                user_message: user_message.clone(),
                schema: node_schema.clone(),
            })
            .await?;

        match parse_and_validate(&first, goal) {
            Ok(nodes) => Ok(nodes),
            Err(err) => {
                let (path, reason) = match &err {
                    PlannerError::Validation { path, reason } => (path.clone(), reason.clone()),
                    PlannerError::MalformedResponse(reason) => {
                        ("execution_plan".to_string(), reason.clone())
                    }
                    PlannerError::Lm(_) => return Err(err),
                };
                tracing::warn!(
                    task_id = %goal.task_id,
                    path = %path,
                    "Plan failed validation, retrying with clarification: {reason}"
                );

                let clarified = format!(
                    "{user_message}\n\nThe previous response failed validation at {path}: {reason}. \
                     Respond again with a corrected {{\"execution_plan\": [...]}} object."
                );
                let second = self
                    .complete(PlanRequest {
                        system_prompt: system,
                        user_message: clarified,
                        schema: node_schema,
                    })
                    .await?;
                parse_and_validate(&second, goal)
            }
        }
    }
}

/// Parse `{"execution_plan": [...]}` and validate every node against the
/// goal. Array order is preserved; ties in priority keep that order.
fn parse_and_validate(
    response: &Value,
    goal: &TaskGoal,
) -> Result<Vec<ExecutionNode>, PlannerError> {
    let plan = response
        .get("execution_plan")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            PlannerError::MalformedResponse(
                "missing top-level \"execution_plan\" array".to_string(),
            )
        })?;

    if plan.is_empty() {
        return Err(PlannerError::MalformedResponse(
            "execution_plan is empty".to_string(),
        ));
    }

    let mut nodes = Vec::with_capacity(plan.len());
    for (i, raw) in plan.iter().enumerate() {
        let node: ExecutionNode =
            serde_json::from_value(raw.clone()).map_err(|e| PlannerError::Validation {
                path: format!("execution_plan[{i}]"),
                reason: e.to_string(),
            })?;
        validate::node(&node, goal).map_err(|e| PlannerError::Validation {
            path: format!("execution_plan[{i}].{}", e.path),
            reason: e.reason,
        })?;
        nodes.push(node);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLm;
    use serde_json::json;

    fn goal() -> TaskGoal {
        TaskGoal::new("t-1", "navigate to https://example.com and screenshot it")
    }

    fn valid_plan() -> Value {
        json!({
            "execution_plan": [
                {
                    "node_id": "n1",
                    "priority": 1,
                    "action": {
                        "tool_name": "navigate_to",
                        "arguments": {"url": "https://example.com"},
                        "max_attempts": 2,
                        "execution_timeout_seconds": 20,
                        "confidence_score": 0.9,
                        "on_failure": "RE_EVALUATE"
                    }
                },
                {
                    "node_id": "n2",
                    "parent_id": "n1",
                    "priority": 1,
                    "action": {
                        "tool_name": "take_screenshot",
                        "arguments": {"task_topic": "example"},
                        "max_attempts": 1,
                        "execution_timeout_seconds": 20,
                        "confidence_score": 0.8
                    }
                }
            ]
        })
    }

    #[tokio::test]
    async fn accepts_a_valid_plan_first_try() {
        let lm = Arc::new(ScriptedLm::new(vec![Ok(valid_plan())]));
        let planner = Planner::new(lm.clone());
        let nodes = planner.plan(&goal(), None, "").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_id, "n1");
        assert_eq!(nodes[1].parent_id.as_deref(), Some("n1"));
        assert_eq!(lm.calls(), 1);
    }

    #[tokio::test]
    async fn retries_once_with_a_clarification() {
        let bad = json!({
            "execution_plan": [{
                "node_id": "n1",
                "priority": 1,
                "action": {
                    "tool_name": "unknown_tool",
                    "arguments": {},
                    "max_attempts": 1,
                    "execution_timeout_seconds": 10,
                    "confidence_score": 1.2
                }
            }]
        });
        let lm = Arc::new(ScriptedLm::new(vec![Ok(bad), Ok(valid_plan())]));
        let planner = Planner::new(lm.clone());
        let nodes = planner.plan(&goal(), None, "").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(lm.calls(), 2);

        let second_prompt = lm.last_user_message();
        assert!(second_prompt.contains("failed validation at execution_plan[0]"));
    }

    #[tokio::test]
    async fn fails_after_the_single_retry() {
        let bad = json!({"execution_plan": [{"node_id": "", "priority": 1, "action": {
            "tool_name": "navigate_to", "arguments": {}, "max_attempts": 1,
            "execution_timeout_seconds": 10, "confidence_score": 0.5}}]});
        let lm = Arc::new(ScriptedLm::new(vec![Ok(bad.clone()), Ok(bad)]));
        let planner = Planner::new(lm);
        let err = planner.plan(&goal(), None, "").await.unwrap_err();
        assert!(matches!(err, PlannerError::Validation { .. }));
    }

    #[tokio::test]
    async fn malformed_envelope_is_retried_then_rejected() {
        let lm = Arc::new(ScriptedLm::new(vec![
            Ok(json!({"plan": []})),
            Ok(json!({"execution_plan": []})),
        ]));
        let planner = Planner::new(lm);
        let err = planner.plan(&goal(), None, "").await.unwrap_err();
        assert!(matches!(err, PlannerError::MalformedResponse(_)));
    }
}
