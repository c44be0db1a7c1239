pub mod query;
pub mod resources;

use std::sync::Arc;

use axum::{
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::client::HttpClientProvider;
use crate::config::ServerConfig;
use crate::executor::Executor;
use crate::metrics;
use crate::{BridgeError, Result};

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<HttpClientProvider>,
    pub executor: Arc<Executor>,
}

impl AppState {
    pub fn new(provider: Arc<HttpClientProvider>) -> Self {
        Self {
            executor: Arc::new(Executor::new(provider.clone())),
            provider,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(HttpClientProvider::default()))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query::query_data))
        .route(
            "/resources/*path",
            get(resources::call_resource).post(resources::call_resource),
        )
        .route("/health", get(check_health))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn check_health() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": ""
    }))
}

async fn render_metrics() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr = config
        .socket_addr()
        .map_err(|e| BridgeError::Internal(format!("Invalid bind address: {}", e)))?;
    info!("Starting timely bridge on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, router(state))
        .await
        .map_err(|e| BridgeError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
