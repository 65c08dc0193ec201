//! take_screenshot - capture the page as a PNG artifact.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::error::codes;
use crate::paths;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct TakeScreenshotTool;

#[derive(Deserialize)]
struct Params {
    task_topic: String,
    #[serde(default)]
    full_page: bool,
}

#[async_trait]
impl Tool for TakeScreenshotTool {
    fn name(&self) -> &str {
        "take_screenshot"
    }

    fn description(&self) -> &str {
        "Capture the page to a PNG file; output is the absolute path."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_topic": { "type": "string", "description": "Short label for the filename" },
                "full_page": { "type": "boolean", "default": false }
            },
            "required": ["task_topic"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let bytes = match ctx.browser.screenshot(params.full_page).await {
            Ok(bytes) => bytes,
            Err(e) => return ToolOutcome::from_browser(&e),
        };

        let file_name = format!(
            "{}_{}.png",
            paths::slug(&params.task_topic),
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = ctx.screenshots_dir.join(file_name);

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolOutcome::failed(
                    codes::E_BAD_ARG,
                    format!("cannot create screenshot directory: {e}"),
                );
            }
        }
        match fs::write(&path, &bytes).await {
            Ok(()) => {
                let absolute = path.display().to_string();
                ToolOutcome::success(Some(absolute.clone()), format!("saved {absolute}"))
            }
            Err(e) => ToolOutcome::failed(codes::E_BAD_ARG, format!("cannot write screenshot: {e}")),
        }
    }
}
