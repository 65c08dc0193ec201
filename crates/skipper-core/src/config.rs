//! Environment-driven configuration.
//!
//! Read once at the edges (CLI/server) and handed to constructors; the
//! core never touches the environment from inside a loop.

/// Language-model and browser settings from the environment.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub lm_base_url: Option<String>,
    pub lm_api_key: Option<String>,
    pub lm_model: Option<String>,
    pub headless: bool,
}

impl CoreConfig {
    /// Read `SKIPPER_LM_BASE_URL`, `SKIPPER_LM_API_KEY`,
    /// `SKIPPER_LM_MODEL` and `SKIPPER_HEADLESS`.
    pub fn from_env() -> Self {
        Self {
            lm_base_url: std::env::var("SKIPPER_LM_BASE_URL").ok(),
            lm_api_key: std::env::var("SKIPPER_LM_API_KEY").ok(),
            lm_model: std::env::var("SKIPPER_LM_MODEL").ok(),
            headless: std::env::var("SKIPPER_HEADLESS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }

    /// Build the HTTP model client when the environment is complete.
    pub fn http_model(&self) -> Option<crate::lm::client::HttpModelConfig> {
        Some(crate::lm::client::HttpModelConfig::new(
            self.lm_base_url.clone()?,
            self.lm_api_key.clone()?,
            self.lm_model
                .clone()
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
        ))
    }
}
