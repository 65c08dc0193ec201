//! scroll - move the viewport.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::browser::ScrollDirection;
use crate::error::codes;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct ScrollTool;

#[derive(Deserialize)]
struct Params {
    direction: String,
    #[serde(default)]
    amount: Option<i64>,
}

#[async_trait]
impl Tool for ScrollTool {
    fn name(&self) -> &str {
        "scroll"
    }

    fn description(&self) -> &str {
        "Scroll the page up/down by an amount, or jump to top/bottom."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "direction": { "type": "string", "enum": ["up", "down", "top", "bottom"] },
                "amount": { "type": "integer", "description": "Pixels, for up/down" }
            },
            "required": ["direction"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let Some(direction) = ScrollDirection::parse(&params.direction) else {
            return ToolOutcome::failed(
                codes::E_BAD_ARG,
                format!("unknown scroll direction '{}'", params.direction),
            );
        };

        match ctx.browser.scroll(direction, params.amount).await {
            Ok(()) => {
                let url = ctx.browser.page_state().await.url;
                ToolOutcome::success(Some(url), format!("scrolled {}", params.direction))
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}
