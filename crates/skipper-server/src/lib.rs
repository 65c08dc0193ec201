//! Skipper Server
//!
//! HTTP + WebSocket surface over the core task registry. This is a
//! library crate - the server is started via `start_server()` with the
//! language-model and browser collaborators injected by the caller.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::Method,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use skipper_core::browser::SessionProvider;
use skipper_core::lm::LanguageModel;
use skipper_core::{EventBus, LoopServices, TaskRegistry};

pub mod error;
pub mod routes;
pub mod types;
pub mod ws;

/// Configuration for starting the server.
pub struct ServerConfig {
    /// Port to listen on (default: 3000).
    pub port: u16,
    /// Default headless flag for tasks that do not specify one.
    pub headless: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            headless: true,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
}

/// Build the Axum router around an already-wired registry.
pub fn build_router(registry: Arc<TaskRegistry>) -> (Router, AppState) {
    let state = AppState { registry };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::handler))
        .nest("/tasks", routes::tasks::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Wire the default registry from collaborators and start serving.
/// Blocks until shutdown.
pub async fn start_server(
    config: ServerConfig,
    lm: Arc<dyn LanguageModel>,
    provider: Arc<dyn SessionProvider>,
) -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::new());
    let services = Arc::new(
        LoopServices::new(lm, provider, bus).with_graph_snapshots(skipper_core::paths::graphs_dir()),
    );
    let registry =
        Arc::new(TaskRegistry::new(services).with_default_headless(config.headless));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let (app, _state) = build_router(registry);

    tracing::info!("Skipper server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: HashMap::from([("tasks".to_string(), true), ("ws".to_string(), true)]),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    features: HashMap<String, bool>,
}
