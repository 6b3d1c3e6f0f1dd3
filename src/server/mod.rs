pub mod api;

use crate::config::{normalize_prefix, Settings};
use crate::services::{AgentRunner, ToolRegistry};
use axum::{
    extract::FromRef,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub type SharedAgent = Arc<dyn AgentRunner>;
pub type SharedTools = Arc<ToolRegistry>;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub agent: SharedAgent,
    pub tools: SharedTools,
}

impl FromRef<AppState> for SharedAgent {
    fn from_ref(app_state: &AppState) -> SharedAgent {
        app_state.agent.clone()
    }
}

impl FromRef<AppState> for SharedTools {
    fn from_ref(app_state: &AppState) -> SharedTools {
        app_state.tools.clone()
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(app_state: &AppState) -> Arc<Settings> {
        app_state.settings.clone()
    }
}

/// Install the fmt subscriber (`RUST_LOG`, default `info`); later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

/// CORS from configured origins; `*` allows any origin
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();
    cors.allow_origin(parsed)
}

/// Build the router with every route under the configured API prefix
pub fn app_router(state: AppState) -> Router {
    // axum rejects route paths without a leading '/'
    let prefix = normalize_prefix(&state.settings.api_v1_prefix);
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route(&format!("{}/chat", prefix), post(api::chat_handler))
        .route(&format!("{}/tools", prefix), get(api::tools_handler))
        .route("/health", get(api::health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the axum server
pub async fn serve(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let prefix = normalize_prefix(&state.settings.api_v1_prefix);
    tracing::info!("Starting {}", state.settings.project_name);

    tracing::info!("Registering routes:");
    tracing::info!("  POST {}/chat", prefix);
    tracing::info!("  GET  {}/tools?source=mcp&source=backend", prefix);
    tracing::info!("  GET  /health");

    let app = app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
