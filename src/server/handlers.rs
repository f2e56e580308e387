//! HTTP Handlers

use super::types::{ConnectionCount, HealthStatus};
use crate::connection::ConnectionManager;
use crate::metrics::Metrics;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub metrics: Arc<Metrics>,
    pub max_message_size: usize,
    pub start_time: Instant,
}

/// Upgrade `/usr/<peer_id>` and serve the connection
///
/// The remainder of the path is the identifier, taken verbatim. A request that
/// cannot be upgraded is rejected and never registered.
pub async fn peer_websocket(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(peer_id = %peer_id, error = %rejection, "Upgrade error");
            return rejection.into_response();
        }
    };

    if state.manager.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let failed_peer_id = peer_id.clone();
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(move |error| {
            warn!(peer_id = %failed_peer_id, error = %error, "Upgrade error");
        })
        .on_upgrade(move |socket| async move {
            let summary = state.manager.handle_websocket(peer_id, socket).await;
            debug!(exit = ?summary.exit, received = summary.received, "Connection finished");
        })
}

/// Current registry size
pub async fn connection_count(State(state): State<AppState>) -> Json<ConnectionCount> {
    Json(ConnectionCount {
        no: state.manager.get_active_connections(),
    })
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let shutting_down = state.manager.is_shutting_down();

    Json(HealthStatus {
        status: if shutting_down { "draining" } else { "healthy" }.to_string(),
        connections: state.manager.get_active_connections(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        shutting_down,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus text exposition
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}
