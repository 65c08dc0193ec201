//! Tool dispatcher - the single synchronous call between the decision
//! loop and the tool layer.
//!
//! Resolves argument templates, enforces the per-attempt timeout ceiling,
//! retries transient failures with exponential backoff, and produces a
//! fresh observation after every attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::agent::cancellation::CancelFlag;
use crate::browser::BrowserSession;
use crate::error::codes;
use crate::model::{ActionFeedback, DecisionAction, FeedbackStatus, WebObservation};
use crate::template;
use crate::tools::{ToolContext, ToolOutcome, ToolRegistry};

const BACKOFF_BASE_MS: u64 = 250;
const BACKOFF_CAP_MS: u64 = 4_000;

/// Result of dispatching one action.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub observation: WebObservation,
    pub feedback: ActionFeedback,
    /// Per-tool string projection, present on success.
    pub output: Option<String>,
    /// How many attempts actually ran.
    pub attempts: u32,
}

/// Stateless between calls apart from the registry; the browser session
/// handle rides in the `ToolContext`.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Backoff before retry `attempt` (1-based): 250 ms doubling, 4 s cap.
    pub fn backoff_delay(attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        Duration::from_millis((BACKOFF_BASE_MS << exp).min(BACKOFF_CAP_MS))
    }

    pub async fn dispatch(
        &self,
        action: &DecisionAction,
        ctx: &ToolContext,
        prior_outputs: &HashMap<String, String>,
        cancel: &CancelFlag,
        memory_context: &str,
    ) -> DispatchResult {
        // 1. Resolve ${node_id.field} templates before anything runs.
        let arguments = match resolve_arguments(&action.arguments, prior_outputs) {
            Ok(args) => args,
            Err(path) => {
                let feedback = ActionFeedback::failed(
                    codes::E_UNRESOLVED_REF,
                    format!("unresolved reference {path}"),
                );
                return self
                    .finish(ctx, feedback, None, 0, memory_context)
                    .await;
            }
        };

        // 2. Unknown tools are permanent failures.
        let Some(tool) = self.registry.get(&action.tool_name) else {
            let feedback = ActionFeedback::failed(
                codes::E_TOOL_UNKNOWN,
                format!("unknown tool '{}'", action.tool_name),
            );
            return self.finish(ctx, feedback, None, 0, memory_context).await;
        };

        // 3. Attempt loop with the timeout ceiling per attempt.
        let ceiling = Duration::from_secs(action.execution_timeout_seconds);
        let mut attempts = 0u32;
        let mut last = ToolOutcome::failed(codes::E_TIMEOUT, "never attempted");

        while attempts < action.max_attempts {
            attempts += 1;

            let attempt = async {
                let outcome = tool.invoke(Value::Object(arguments.clone()), ctx).await;
                if outcome.is_success() {
                    // The post-action wait shares the attempt's budget.
                    if let Some(condition) = &action.wait_for_condition_after {
                        if let Err(e) = ctx.browser.wait_for(condition).await {
                            return ToolOutcome::from_browser(&e);
                        }
                    }
                }
                outcome
            };

            last = match tokio::time::timeout(ceiling, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => ToolOutcome {
                    feedback: ActionFeedback::timeout(format!(
                        "'{}' did not return within {}s",
                        action.tool_name, action.execution_timeout_seconds
                    )),
                    output: None,
                },
            };

            if last.is_success() || !is_transient(&last.feedback) {
                break;
            }
            if attempts >= action.max_attempts || cancel.is_cancelled() {
                break;
            }

            tracing::debug!(
                tool = %action.tool_name,
                attempt = attempts,
                code = last.feedback.error_code.as_deref().unwrap_or("-"),
                "Transient tool failure, backing off"
            );
            tokio::time::sleep(Self::backoff_delay(attempts)).await;
        }

        let ToolOutcome { feedback, output } = last;
        self.finish(ctx, feedback, output, attempts, memory_context)
            .await
    }

    async fn finish(
        &self,
        ctx: &ToolContext,
        feedback: ActionFeedback,
        output: Option<String>,
        attempts: u32,
        memory_context: &str,
    ) -> DispatchResult {
        let observation = observe(&ctx.browser, Some(feedback.clone()), memory_context).await;
        DispatchResult {
            observation,
            feedback,
            output,
            attempts,
        }
    }
}

fn is_transient(feedback: &ActionFeedback) -> bool {
    match feedback.status {
        FeedbackStatus::Timeout => true,
        FeedbackStatus::Failed => feedback
            .error_code
            .as_deref()
            .map(codes::is_transient)
            .unwrap_or(false),
        FeedbackStatus::Success | FeedbackStatus::Partial => false,
    }
}

/// Build a `WebObservation` from the live page state.
pub async fn observe(
    browser: &Arc<dyn BrowserSession>,
    feedback: Option<ActionFeedback>,
    memory_context: &str,
) -> WebObservation {
    let state = browser.page_state().await;
    WebObservation {
        timestamp: chrono::Utc::now(),
        current_url: state.url,
        http_status: state.http_status,
        load_time_ms: state.load_time_ms,
        authenticated: state.authenticated,
        key_elements: state.key_elements,
        screenshot_available: false,
        action_feedback: feedback,
        memory_context: memory_context.to_string(),
        browser_health: state.health,
    }
}

/// Resolve templates in every string argument, recursing through arrays
/// and nested objects. Returns the first unresolved `${...}` path.
fn resolve_arguments(
    arguments: &serde_json::Map<String, Value>,
    outputs: &HashMap<String, String>,
) -> Result<serde_json::Map<String, Value>, String> {
    let mut resolved = serde_json::Map::with_capacity(arguments.len());
    for (key, value) in arguments {
        resolved.insert(key.clone(), resolve_value(value, outputs)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, outputs: &HashMap<String, String>) -> Result<Value, String> {
    match value {
        Value::String(s) => template::resolve(s, outputs).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, outputs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, outputs)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
