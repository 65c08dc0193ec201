//! Request and response types for the API

use serde::{Deserialize, Serialize};
use skipper_core::model::TaskExecution;

// ============================================================================
// Task Types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    #[serde(default)]
    pub headless: Option<bool>,
}

#[derive(Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskExecution>,
}

#[derive(Serialize)]
pub struct StopResponse {
    pub ok: bool,
}

/// Readiness of the live browser view.
#[derive(Serialize)]
pub struct CdpUrlResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// "ready", "waiting" or "completed".
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// WebSocket Types
// ============================================================================

/// Messages clients send over /ws. Unknown events are ignored.
#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WsClientMessage {
    JoinTask { task_uuid: String },
    Ping,
    #[serde(other)]
    Unknown,
}
