//! API server implementation.
//!
//! Provides health, ready, and `/api/v1` mapping endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crosswalk_core::catalog::ControlCatalog;
use crosswalk_core::store::JobStore;
use crosswalk_flow::queue::RequestQueue;

use crate::config::ApiConfig;
use crate::routes;

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: ApiConfig,
    /// Job lifecycle store.
    pub jobs: Arc<dyn JobStore>,
    /// Read-only control/framework catalog.
    pub catalog: Arc<dyn ControlCatalog>,
    /// Request queue feeding the workers.
    pub queue: Arc<dyn RequestQueue>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("jobs", &"<JobStore>")
            .field("catalog", &"<ControlCatalog>")
            .field("queue", &"<RequestQueue>")
            .finish()
    }
}

impl AppState {
    /// Creates new application state over the given backends.
    #[must_use]
    pub fn new(
        config: ApiConfig,
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn ControlCatalog>,
        queue: Arc<dyn RequestQueue>,
    ) -> Self {
        Self {
            config,
            jobs,
            catalog,
            queue,
        }
    }
}

// ============================================================================
// Handlers and Router
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    // Ready when the backing stores answer a trivial read.
    let ready = state.queue.depth().await.is_ok()
        && state.catalog.list_framework_keys().await.is_ok();
    Json(ReadyResponse { ready })
}

/// Builds the full application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .nest("/api/v1", routes::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves the API until terminated.
///
/// # Errors
///
/// Returns an error when the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "crosswalk API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
