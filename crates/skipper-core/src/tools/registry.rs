//! Tool registry and the tool contract the dispatcher consumes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{BrowserError, BrowserSession};
use crate::error::codes;
use crate::model::{ActionFeedback, FeedbackStatus};
use crate::paths;

/// What one tool invocation produced: the outcome descriptor plus the
/// string projection descendants may reference via `${node.output}`.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub feedback: ActionFeedback,
    pub output: Option<String>,
}

impl ToolOutcome {
    pub fn success(output: Option<String>, message: impl Into<String>) -> Self {
        Self {
            feedback: ActionFeedback::success(message),
            output,
        }
    }

    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            feedback: ActionFeedback::failed(code, message),
            output: None,
        }
    }

    pub fn from_browser(err: &BrowserError) -> Self {
        Self::failed(err.code(), err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.feedback.status == FeedbackStatus::Success
    }
}

/// Parse tool parameters, returning a bad-argument outcome on failure.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolOutcome> {
    serde_json::from_value(params)
        .map_err(|e| ToolOutcome::failed(codes::E_BAD_ARG, format!("invalid parameters: {e}")))
}

/// Context for tool execution. One per task; the browser session handle
/// is the only shared resource, exclusively owned by the task's loop.
pub struct ToolContext {
    pub browser: Arc<dyn BrowserSession>,
    /// Human description of the task, used for artifact filenames.
    pub task_description: String,
    pub screenshots_dir: PathBuf,
    pub notes_dir: PathBuf,
}

impl ToolContext {
    pub fn new(browser: Arc<dyn BrowserSession>, task_description: impl Into<String>) -> Self {
        Self {
            browser,
            task_description: task_description.into(),
            screenshots_dir: paths::screenshots_dir(),
            notes_dir: paths::notes_dir(),
        }
    }
}

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id), as it appears in `TaskGoal.allowed_actions`.
    fn name(&self) -> &str;

    /// One-line description for logs and debugging.
    fn description(&self) -> &str;

    /// JSON schema for parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. Argument templates are already resolved by the
    /// dispatcher; `params` is the concrete argument object.
    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Registry of the tools a dispatcher may invoke. Built once at startup
/// and shared read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}
