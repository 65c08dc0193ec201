//! open_notepad - save text output as a local note.
//!
//! Launching an actual editor is the OS collaborator's business; the core
//! writes the file and reports its path.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::error::codes;
use crate::paths;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct OpenNotepadTool;

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    file_path: Option<String>,
    initial_content: String,
}

#[async_trait]
impl Tool for OpenNotepadTool {
    fn name(&self) -> &str {
        "open_notepad"
    }

    fn description(&self) -> &str {
        "Write text to a local note file; output is the file path."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Target path; defaults to the task notes directory" },
                "initial_content": { "type": "string" }
            },
            "required": ["initial_content"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let path: PathBuf = match params.file_path {
            Some(p) => PathBuf::from(p),
            None => ctx.notes_dir.join(format!(
                "{}_{}.txt",
                paths::slug(&ctx.task_description),
                chrono::Utc::now().format("%Y%m%d_%H%M%S")
            )),
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolOutcome::failed(
                    codes::E_BAD_ARG,
                    format!("cannot create notes directory: {e}"),
                );
            }
        }
        match fs::write(&path, params.initial_content.as_bytes()).await {
            Ok(()) => {
                let absolute = path.display().to_string();
                ToolOutcome::success(Some(absolute.clone()), format!("note saved to {absolute}"))
            }
            Err(e) => ToolOutcome::failed(codes::E_BAD_ARG, format!("cannot write note: {e}")),
        }
    }
}
