//! Skipper CLI - wires configuration and starts the server.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use skipper_core::browser::{BrowserError, BrowserSession, SessionProvider};
use skipper_core::config::CoreConfig;
use skipper_core::lm::client::HttpLanguageModel;
use skipper_server::{start_server, ServerConfig};

#[derive(Parser)]
#[command(name = "skipper", version, about = "Goal-directed web automation agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP/WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Run browsers headed instead of headless by default.
        #[arg(long)]
        headed: bool,
    },
}

/// Placeholder provider for installs without a browser collaborator.
/// Tasks fail at session acquisition with a clear log instead of
/// pretending to automate anything.
struct UnavailableBrowserProvider;

#[async_trait]
impl SessionProvider for UnavailableBrowserProvider {
    async fn acquire(
        &self,
        _task_id: &str,
        _headless: bool,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        Err(BrowserError::Disconnected(
            "no browser collaborator configured".into(),
        ))
    }

    async fn release(&self, _task_id: &str) {}

    fn cdp_url(&self, _task_id: &str) -> Option<String> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skipper=info,skipper_core=info,skipper_server=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port, headed } => {
            let config = CoreConfig::from_env();

            let model_config = config.http_model().context(
                "language model not configured; set SKIPPER_LM_BASE_URL and SKIPPER_LM_API_KEY",
            )?;
            let lm = Arc::new(HttpLanguageModel::new(model_config));

            tracing::warn!(
                "No browser collaborator wired in this build; tasks will fail at session acquisition"
            );
            let provider = Arc::new(UnavailableBrowserProvider);

            let server_config = ServerConfig {
                port,
                headless: !headed && config.headless,
            };
            start_server(server_config, lm, provider).await
        }
    }
}
