//! navigate_to - drive the browser to a URL.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct NavigateTool;

#[derive(Deserialize)]
struct Params {
    url: String,
}

#[async_trait]
impl Tool for NavigateTool {
    fn name(&self) -> &str {
        "navigate_to"
    }

    fn description(&self) -> &str {
        "Navigate the browser to a full URL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Full URL including scheme" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        match ctx.browser.navigate(&params.url).await {
            Ok(()) => {
                let state = ctx.browser.page_state().await;
                ToolOutcome::success(
                    Some(state.url.clone()),
                    format!("navigated to {}", state.url),
                )
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}
