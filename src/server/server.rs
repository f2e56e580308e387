//! Relay HTTP Server

use super::{api::RelayApi, handlers::AppState};
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::metrics::Metrics;
use crate::Result;
use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Serves the peer endpoint and the HTTP surface
pub struct RelayServer {
    config: Arc<Config>,
    app_state: AppState,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(config: Arc<Config>, manager: Arc<ConnectionManager>, metrics: Arc<Metrics>) -> Self {
        let app_state = AppState {
            manager,
            metrics,
            max_message_size: config.server.max_message_size,
            start_time: Instant::now(),
        };

        Self { config, app_state }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let bind_addr = self.config.server.bind_addr;
        TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind relay server to {}", bind_addr))
    }

    /// Serve on `listener` until `shutdown` resolves
    ///
    /// On shutdown the server stops accepting, tells the connection manager to
    /// end every receive loop, and waits for in-flight connections to finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr().context("Failed to read local address")?;
        info!("Relay server listening on {}", local_addr);

        let manager = Arc::clone(&self.app_state.manager);
        let app = self.create_router();

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                manager.initiate_shutdown();
            })
            .await;

        if let Err(e) = result {
            error!("Relay server error: {}", e);
            return Err(e.into());
        }

        info!("Relay server on {} stopped", local_addr);
        Ok(())
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.server.bind_addr
    }

    /// Create the router, also used by tests
    pub fn create_router(&self) -> Router {
        RelayApi::create_router(self.app_state.clone(), &self.config)
    }
}
