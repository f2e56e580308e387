//! Connection Manager Implementation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocket;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, instrument, warn};

use super::handle::ConnectionHandle;
use super::registry::ConnectionRegistry;
use super::websocket;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::routing::{LoopSummary, Router};
use crate::Result;

/// Manages peer connections and their lifecycle
///
/// Every accepted connection goes through register -> receive loop ->
/// unregister -> close. The last two steps run on every exit path.
pub struct ConnectionManager {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
    router: Router,
    outbound_queue_size: usize,
    shutdown_flag: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<Metrics>,
        outbound_queue_size: usize,
    ) -> Self {
        let router = Router::new(Arc::clone(&registry), Arc::clone(&metrics));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            registry,
            metrics,
            router,
            outbound_queue_size,
            shutdown_flag: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Create a ConnectionManager sized from configuration
    pub fn from_config(
        config: &Config,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::new(registry, metrics, config.server.outbound_queue_size)
    }

    /// Get the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of registered peers
    pub fn get_active_connections(&self) -> usize {
        self.registry.count()
    }

    /// Serve an upgraded WebSocket for `peer_id` until it ends
    pub async fn handle_websocket(&self, peer_id: String, socket: WebSocket) -> LoopSummary {
        let (handle, inbound, _writer) =
            websocket::attach(socket, &peer_id, self.outbound_queue_size);
        self.serve_connection(peer_id, handle, inbound).await
    }

    /// Register `handle` under `peer_id`, run its receive loop, then
    /// unregister and close it
    #[instrument(skip_all, fields(peer_id = %peer_id, connection_id = %handle.id()))]
    pub async fn serve_connection<S, E>(
        &self,
        peer_id: String,
        handle: Arc<ConnectionHandle>,
        inbound: S,
    ) -> LoopSummary
    where
        S: Stream<Item = std::result::Result<Vec<u8>, E>> + Unpin,
        E: fmt::Display,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if self.shutdown_flag.load(Ordering::Relaxed) {
            debug!("Rejecting connection due to shutdown");
            handle.close();
            return LoopSummary::rejected();
        }

        if let Some(previous) = self.registry.register(peer_id.clone(), Arc::clone(&handle)) {
            warn!(replaced = %previous.id(), "Identifier re-registered, previous connection is no longer reachable");
        }
        self.metrics.connection_opened();
        info!("New connection: {} | total: {}", peer_id, self.registry.count());

        let _registration = Registration {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            peer_id: peer_id.clone(),
            handle: Arc::clone(&handle),
            started: Instant::now(),
        };

        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        let summary = self.router.run(&peer_id, inbound, shutdown).await;

        debug!(
            received = summary.received,
            forwarded = summary.forwarded,
            dropped = summary.dropped,
            exit = ?summary.exit,
            "Receive loop stopped"
        );

        summary
    }

    /// Signal every connection loop to stop and refuse new connections
    pub fn initiate_shutdown(&self) {
        info!("Initiating connection manager shutdown");
        self.shutdown_flag.store(true, Ordering::Relaxed);
        // No receivers simply means no open connections
        let _ = self.shutdown_tx.send(());
    }

    /// Whether shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Wait until the registry drains or `timeout` elapses
    pub async fn wait_for_connections_to_close(&self, timeout: Duration) -> Result<()> {
        let start_time = Instant::now();
        let mut last_count = self.get_active_connections();

        while last_count > 0 && start_time.elapsed() < timeout {
            sleep(Duration::from_millis(100)).await;

            let current_count = self.get_active_connections();
            if current_count != last_count {
                debug!("Active connections: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        if last_count == 0 {
            info!("All connections closed in {:?}", start_time.elapsed());
            Ok(())
        } else {
            anyhow::bail!(
                "{} connections still registered after {:?}",
                last_count,
                timeout
            )
        }
    }
}

/// Unregisters and closes a connection when dropped, so cleanup also runs
/// when the loop panics or its task is cancelled
struct Registration {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
    peer_id: String,
    handle: Arc<ConnectionHandle>,
    started: Instant,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let removed = self.registry.unregister(&self.peer_id, &self.handle);
        if !removed {
            debug!(peer_id = %self.peer_id, "Registration already taken over by a newer connection");
        }
        self.handle.close();
        self.metrics.connection_closed(self.started.elapsed());

        info!(
            "Disconnected {} | remaining: {} | after {:?}",
            self.peer_id,
            self.registry.count(),
            self.started.elapsed()
        );
    }
}
