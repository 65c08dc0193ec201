//! Language-model capability.
//!
//! The planner only needs one thing from a model: given a system prompt,
//! a user message and the node schema, return a JSON document. The
//! transport lives behind `LanguageModel` so tests can script it and the
//! server can swap providers without touching the core.

pub mod client;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LmError;

/// Default per-call budget in seconds.
pub const DEFAULT_CALL_BUDGET_SECS: u64 = 60;

/// One planning request. The schema rides along so transports that
/// support structured output can forward it as a constraint.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub schema: Value,
}

/// The capability the planner consumes: prompt + schema in, JSON out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: PlanRequest) -> Result<Value, LmError>;
}
