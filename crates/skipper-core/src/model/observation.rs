//! Observations - what the browser looked like after an action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome token for the last action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackStatus {
    Success,
    Failed,
    Timeout,
    Partial,
}

/// Outcome descriptor for the last action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFeedback {
    pub status: FeedbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
}

impl ActionFeedback {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Success,
            error_code: None,
            message: message.into(),
        }
    }

    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Failed,
            error_code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Timeout,
            error_code: Some(crate::error::codes::E_TIMEOUT.to_string()),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FeedbackStatus::Success
    }
}

/// Axis-aligned bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Snapshot of one page element, produced by the tool layer and
/// read-only inside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyElement {
    pub element_id: String,
    pub tag: String,
    /// XPath selector that re-locates the element.
    pub xpath: String,
    pub text: String,
    pub visible: bool,
    pub clickable: bool,
    pub bounds: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// Health tag for the browser collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowserHealth {
    #[default]
    Healthy,
    Degraded,
    Disconnected,
}

/// The most recent environment snapshot. One is produced after every
/// dispatch attempt and retained on the originating node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebObservation {
    pub timestamp: DateTime<Utc>,
    pub current_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub load_time_ms: u64,
    pub authenticated: bool,
    pub key_elements: Vec<KeyElement>,
    pub screenshot_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_feedback: Option<ActionFeedback>,
    /// Short rolling context the planner sees on the next call.
    pub memory_context: String,
    pub browser_health: BrowserHealth,
}

impl WebObservation {
    /// An observation for a task that has not touched the browser yet.
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            current_url: String::new(),
            http_status: None,
            load_time_ms: 0,
            authenticated: false,
            key_elements: Vec::new(),
            screenshot_available: false,
            action_feedback: None,
            memory_context: String::new(),
            browser_health: BrowserHealth::default(),
        }
    }

    /// One-paragraph summary used in planner prompts.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "url={} status={} load_ms={} elements={}",
            if self.current_url.is_empty() {
                "(blank)"
            } else {
                &self.current_url
            },
            self.http_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.load_time_ms,
            self.key_elements.len(),
        );
        if let Some(fb) = &self.action_feedback {
            out.push_str(&format!(
                " last_action={:?}{} \"{}\"",
                fb.status,
                fb.error_code
                    .as_deref()
                    .map(|c| format!("({})", c))
                    .unwrap_or_default(),
                fb.message
            ));
        }
        out
    }
}
