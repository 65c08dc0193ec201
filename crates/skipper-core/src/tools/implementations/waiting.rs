//! wait / wait_for - explicit pauses and page-condition waits.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::codes;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct WaitTool;

#[derive(Deserialize)]
struct WaitParams {
    seconds: f64,
}

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for a fixed number of seconds."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": { "type": "number", "exclusiveMinimum": 0 }
            },
            "required": ["seconds"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, _ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<WaitParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if !params.seconds.is_finite() || params.seconds <= 0.0 {
            return ToolOutcome::failed(codes::E_BAD_ARG, "seconds must be a positive number");
        }

        tokio::time::sleep(Duration::from_secs_f64(params.seconds)).await;
        ToolOutcome::success(None, format!("waited {}s", params.seconds))
    }
}

pub struct WaitForTool;

#[derive(Deserialize)]
struct WaitForParams {
    condition: String,
}

#[async_trait]
impl Tool for WaitForTool {
    fn name(&self) -> &str {
        "wait_for"
    }

    fn description(&self) -> &str {
        "Wait until a page condition holds, e.g. 'networkidle' or 'selector:#id'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "condition": { "type": "string" }
            },
            "required": ["condition"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<WaitForParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.browser.wait_for(&params.condition).await {
            Ok(()) => ToolOutcome::success(None, format!("condition '{}' held", params.condition)),
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}
