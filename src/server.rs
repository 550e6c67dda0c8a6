//! HTTP reporting surface.
//!
//! Exposes the sync status and on-demand session reconciliation to a
//! dashboard or health checker:
//!
//! ```text
//! GET /health                              liveness
//! GET /status                              sync scheduler snapshot
//! GET /sessions?start=YYYY-MM-DD&end=...   reconciled attendance sessions
//! ```

use crate::core::{reconcile_link, AttendanceSession, DateRange, ReconcileError};
use crate::device::DeviceLink;
use crate::sync::{SharedSyncMonitor, SyncStatus};
use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    link: DeviceLink,
    monitor: SharedSyncMonitor,
}

impl ServerState {
    pub fn new(link: DeviceLink, monitor: SharedSyncMonitor) -> Self {
        Self { link, monitor }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub device_connected: bool,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Query parameters for `/sessions`
#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl SessionsQuery {
    fn range(&self) -> Option<DateRange> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            (Some(start), None) => Some(DateRange::new(start, NaiveDate::MAX)),
            (None, Some(end)) => Some(DateRange::new(NaiveDate::MIN, end)),
            (None, None) => None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        device_connected: state.link.is_connected(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<SyncStatus> {
    Json(state.monitor.snapshot())
}

/// GET /sessions
async fn sessions(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Vec<AttendanceSession>>, ApiError> {
    reconcile_link(&state.link, query.range())
        .await
        .map(Json)
        .map_err(|e| match e {
            ReconcileError::NotConnected => {
                api_error(StatusCode::SERVICE_UNAVAILABLE, "NOT_CONNECTED", e)
            }
            ReconcileError::Device(_) => {
                tracing::error!("Device read failed: {}", e);
                api_error(StatusCode::BAD_GATEWAY, "DEVICE_ERROR", e)
            }
            ReconcileError::InvalidRange { .. } | ReconcileError::MissingUserId { .. } => {
                api_error(StatusCode::BAD_REQUEST, "INVALID_INPUT", e)
            }
        })
}

/// Build the router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/sessions", get(sessions))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Reporting server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
