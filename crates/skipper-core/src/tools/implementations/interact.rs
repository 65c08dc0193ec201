//! Element interaction tools: click_element, click_nth, type_text.
//!
//! All three project the post-action URL as their resolved output.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

async fn post_action_url(ctx: &ToolContext) -> String {
    ctx.browser.page_state().await.url
}

// ── click_element ──────────────────────────────────────────────────────

pub struct ClickElementTool;

#[derive(Deserialize)]
struct ClickParams {
    xpath: String,
}

#[async_trait]
impl Tool for ClickElementTool {
    fn name(&self) -> &str {
        "click_element"
    }

    fn description(&self) -> &str {
        "Click the element located by an XPath expression."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "xpath": { "type": "string" }
            },
            "required": ["xpath"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<ClickParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.browser.click(&params.xpath).await {
            Ok(()) => {
                let url = post_action_url(ctx).await;
                ToolOutcome::success(Some(url), format!("clicked {}", params.xpath))
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}

// ── click_nth ──────────────────────────────────────────────────────────

pub struct ClickNthTool;

#[derive(Deserialize)]
struct ClickNthParams {
    selector: String,
    index: usize,
}

#[async_trait]
impl Tool for ClickNthTool {
    fn name(&self) -> &str {
        "click_nth"
    }

    fn description(&self) -> &str {
        "Click the n-th (0-based) match of a CSS selector."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selector": { "type": "string" },
                "index": { "type": "integer", "minimum": 0 }
            },
            "required": ["selector", "index"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<ClickNthParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.browser.click_nth(&params.selector, params.index).await {
            Ok(()) => {
                let url = post_action_url(ctx).await;
                ToolOutcome::success(
                    Some(url),
                    format!("clicked match {} of '{}'", params.index, params.selector),
                )
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}

// ── type_text ──────────────────────────────────────────────────────────

pub struct TypeTextTool;

#[derive(Deserialize)]
struct TypeParams {
    xpath: String,
    text: String,
    #[serde(default)]
    press_enter: bool,
}

#[async_trait]
impl Tool for TypeTextTool {
    fn name(&self) -> &str {
        "type_text"
    }

    fn description(&self) -> &str {
        "Type text into the element at an XPath, optionally pressing Enter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "xpath": { "type": "string" },
                "text": { "type": "string" },
                "press_enter": { "type": "boolean", "default": false }
            },
            "required": ["xpath", "text"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<TypeParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .browser
            .type_text(&params.xpath, &params.text, params.press_enter)
            .await
        {
            Ok(()) => {
                let url = post_action_url(ctx).await;
                ToolOutcome::success(Some(url), format!("typed into {}", params.xpath))
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}
