//! HTTP language-model client.
//!
//! Non-streaming Anthropic-format call: system + single user message,
//! collect the `content[].text` blocks, parse them as JSON. Providers
//! that speak this format (or proxy it) all work; anything else belongs
//! in its own `LanguageModel` impl.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::LmError;

use super::{LanguageModel, PlanRequest, DEFAULT_CALL_BUDGET_SECS};

const MAX_PLAN_TOKENS: usize = 4096;

/// Configuration for the HTTP client. Values come from the environment
/// at the edges (CLI/server); the core never reads env itself.
#[derive(Debug, Clone)]
pub struct HttpModelConfig {
    /// Base URL, e.g. `https://api.anthropic.com`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-call budget in seconds.
    pub call_budget_secs: u64,
}

impl HttpModelConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            call_budget_secs: DEFAULT_CALL_BUDGET_SECS,
        }
    }
}

pub struct HttpLanguageModel {
    config: HttpModelConfig,
    http: reqwest::Client,
}

impl HttpLanguageModel {
    pub fn new(config: HttpModelConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.call_budget_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, request: PlanRequest) -> Result<Value, LmError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": MAX_PLAN_TOKENS,
            "system": request.system_prompt,
            "messages": [{
                "role": "user",
                "content": request.user_message
            }]
        });

        let send = self
            .http
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send();

        let budget = std::time::Duration::from_secs(self.config.call_budget_secs);
        let response = tokio::time::timeout(budget, send)
            .await
            .map_err(|_| LmError::Timeout(self.config.call_budget_secs))?
            .map_err(|e| LmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(LmError::Transport(format!("HTTP {status}: {detail}")));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LmError::Transport(e.to_string()))?;

        let text = collect_text(&envelope);
        parse_json_payload(&text)
    }
}

fn collect_text(envelope: &Value) -> String {
    let mut text = String::new();
    if let Some(blocks) = envelope.get("content").and_then(|c| c.as_array()) {
        for block in blocks {
            if block.get("type").and_then(|t| t.as_str()) != Some("text") {
                continue;
            }
            if let Some(chunk) = block.get("text").and_then(|t| t.as_str()) {
                text.push_str(chunk);
            }
        }
    }
    text
}

/// Parse model text as JSON, tolerating a surrounding markdown fence.
pub(crate) fn parse_json_payload(text: &str) -> Result<Value, LmError> {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_start_matches('\n'))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(candidate).map_err(|_| {
        let preview: String = trimmed.chars().take(160).collect();
        LmError::BadOutput(preview)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let v = parse_json_payload(r#"{"execution_plan": []}"#).unwrap();
        assert!(v["execution_plan"].is_array());
    }

    #[test]
    fn strips_markdown_fences() {
        let fenced = "```json\n{\"execution_plan\": []}\n```";
        let v = parse_json_payload(fenced).unwrap();
        assert!(v["execution_plan"].is_array());

        let bare_fence = "```\n{\"a\": 1}\n```";
        assert_eq!(parse_json_payload(bare_fence).unwrap()["a"], 1);
    }

    #[test]
    fn rejects_non_json_with_a_preview() {
        let err = parse_json_payload("I will now plan the task...").unwrap_err();
        assert!(matches!(err, LmError::BadOutput(_)));
    }

    #[test]
    fn collects_only_text_blocks() {
        let envelope = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "{\"execution"},
                {"type": "text", "text": "_plan\": []}"}
            ]
        });
        assert_eq!(collect_text(&envelope), "{\"execution_plan\": []}");
    }
}
