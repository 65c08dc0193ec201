//! Data extraction tools: extract_data, get_element_attribute,
//! find_link_by_text.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::codes;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

const ALLOWED_ATTRIBUTES: &[&str] = &["text", "href", "value"];

// ── extract_data ───────────────────────────────────────────────────────

pub struct ExtractDataTool;

#[derive(Deserialize)]
struct ExtractParams {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default = "default_attribute")]
    attribute: String,
    #[serde(default)]
    limit: Option<usize>,
}

fn default_attribute() -> String {
    "text".to_string()
}

#[async_trait]
impl Tool for ExtractDataTool {
    fn name(&self) -> &str {
        "extract_data"
    }

    fn description(&self) -> &str {
        "Extract one attribute from every match of a selector; output is the items joined by newlines."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selector": { "type": "string" },
                "attribute": { "type": "string", "enum": ALLOWED_ATTRIBUTES, "default": "text" },
                "limit": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<ExtractParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if !ALLOWED_ATTRIBUTES.contains(&params.attribute.as_str()) {
            return ToolOutcome::failed(
                codes::E_BAD_ARG,
                format!("attribute must be one of {ALLOWED_ATTRIBUTES:?}"),
            );
        }

        match ctx
            .browser
            .extract(params.selector.as_deref(), &params.attribute, params.limit)
            .await
        {
            Ok(items) => {
                let count = items.len();
                ToolOutcome::success(Some(items.join("\n")), format!("extracted {count} items"))
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}

// ── get_element_attribute ──────────────────────────────────────────────

pub struct GetAttributeTool;

#[derive(Deserialize)]
struct AttributeParams {
    xpath: String,
    attribute: String,
}

#[async_trait]
impl Tool for GetAttributeTool {
    fn name(&self) -> &str {
        "get_element_attribute"
    }

    fn description(&self) -> &str {
        "Read a single attribute from the element at an XPath."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "xpath": { "type": "string" },
                "attribute": { "type": "string" }
            },
            "required": ["xpath", "attribute"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<AttributeParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.browser.attribute(&params.xpath, &params.attribute).await {
            Ok(value) => ToolOutcome::success(
                Some(value),
                format!("read '{}' from {}", params.attribute, params.xpath),
            ),
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}

// ── find_link_by_text ──────────────────────────────────────────────────

pub struct FindLinkTool;

#[derive(Deserialize)]
struct FindLinkParams {
    keyword: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for FindLinkTool {
    fn name(&self) -> &str {
        "find_link_by_text"
    }

    fn description(&self) -> &str {
        "Find links whose visible text contains a keyword; output is one {text, href} JSON object per line."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1 }
            },
            "required": ["keyword"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<FindLinkParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .browser
            .links_by_text(&params.keyword, params.limit)
            .await
        {
            Ok(links) => {
                let count = links.len();
                let lines: Vec<String> = links
                    .iter()
                    .filter_map(|l| serde_json::to_string(l).ok())
                    .collect();
                ToolOutcome::success(
                    Some(lines.join("\n")),
                    format!("found {count} links matching '{}'", params.keyword),
                )
            }
            Err(e) => ToolOutcome::from_browser(&e),
        }
    }
}
