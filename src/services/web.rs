//! Axum-based HTTP server for the operator panel.
//!
//! Provides REST endpoints for:
//! - GET `/api/state` - Full panel snapshot
//! - POST `/api/signals/{name}/line` - Request a route from a signal
//! - POST `/api/signals/{name}/clear` - Cancel the route at a signal
//! - POST `/api/switches/{name}/throw` - Throw a switch to its other position
//!
//! Requests are answered with the [`RequestOutcome`]; the resulting field
//! commands go out on the next tick.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::WebConfig;
use crate::dispatcher::PanelSnapshot;
use crate::traits::Clock;

use super::api::{ApiResponse, RequestOutcome};
use super::shared::SharedPanel;

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /api/state
async fn get_state<C: Clock + Send + 'static>(
    State(panel): State<Arc<SharedPanel<C>>>,
) -> Json<ApiResponse<PanelSnapshot>> {
    Json(ApiResponse::ok(panel.snapshot()))
}

/// POST /api/signals/{name}/line
async fn line_route<C: Clock + Send + 'static>(
    State(panel): State<Arc<SharedPanel<C>>>,
    Path(name): Path<String>,
) -> Json<ApiResponse<RequestOutcome>> {
    Json(ApiResponse::ok(panel.line_route(&name).into()))
}

/// POST /api/signals/{name}/clear
async fn clear_route<C: Clock + Send + 'static>(
    State(panel): State<Arc<SharedPanel<C>>>,
    Path(name): Path<String>,
) -> Json<ApiResponse<RequestOutcome>> {
    Json(ApiResponse::ok(panel.clear_route(&name).into()))
}

/// POST /api/switches/{name}/throw
async fn throw_switch<C: Clock + Send + 'static>(
    State(panel): State<Arc<SharedPanel<C>>>,
    Path(name): Path<String>,
) -> Json<ApiResponse<RequestOutcome>> {
    Json(ApiResponse::ok(panel.throw_switch(&name).into()))
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::err("Not found")),
    )
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from_config(&WebConfig::default())
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    pub fn from_config(config: &WebConfig) -> Self {
        Self {
            addr: ([0, 0, 0, 0], config.port).into(),
            cors_permissive: config.cors_permissive,
        }
    }
}

/// Build the Axum router with all routes
pub fn build_router<C: Clock + Send + 'static>(
    panel: Arc<SharedPanel<C>>,
    config: &WebServerConfig,
) -> Router {
    let mut router = Router::new()
        .route("/api/state", get(get_state::<C>))
        .route("/api/signals/:name/line", post(line_route::<C>))
        .route("/api/signals/:name/clear", post(clear_route::<C>))
        .route("/api/switches/:name/throw", post(throw_switch::<C>))
        .fallback(not_found)
        .with_state(panel);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Serve the operator API on the shared panel until shut down.
pub async fn run_server<C: Clock + Send + 'static>(
    panel: Arc<SharedPanel<C>>,
    config: WebServerConfig,
) -> Result<(), std::io::Error> {
    let router = build_router(panel, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    log::info!("web API listening on http://{}", config.addr);

    axum::serve(listener, router).await
}
