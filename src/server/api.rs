//! HTTP Routes

use super::handlers::*;
use crate::config::Config;
use crate::protocol::PEER_PATH_PREFIX;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

/// Relay HTTP router
pub struct RelayApi;

impl RelayApi {
    /// Create the relay router
    ///
    /// The peer endpoint, `/count` and `/health` are always mounted. Pages and
    /// static files only when the website is enabled, `/metrics` only when
    /// metrics are enabled.
    pub fn create_router(state: AppState, config: &Config) -> Router {
        let peer_route = format!("{}*peer_id", PEER_PATH_PREFIX);

        let mut router = Router::new()
            .route(&peer_route, get(peer_websocket))
            .route("/count", get(connection_count))
            .route("/health", get(health_check));

        if config.monitoring.metrics_enabled {
            router = router.route("/metrics", get(export_metrics));
        }

        let router = router.with_state(state);

        let router = if config.website.enabled {
            let page_dir = &config.website.page_dir;
            router
                .route_service("/", ServeFile::new(page_dir.join("index.html")))
                .route_service("/testws", ServeFile::new(page_dir.join("ws_test.html")))
                .route_service("/testwsrtc", ServeFile::new(page_dir.join("webrtc_test.html")))
                .nest_service("/static", ServeDir::new(page_dir))
        } else {
            router
        };

        router.layer(CorsLayer::permissive())
    }
}
