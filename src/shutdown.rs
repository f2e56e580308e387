//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM and SIGINT, fans the signal out to the HTTP server, and
//! waits for peer connections to unregister before the process exits.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::signal;
use tracing::{info, warn};
use crate::connection::ConnectionManager;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// How long connections get to drain
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Future that resolves once shutdown has been triggered
    pub fn signalled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.subscribe();
        async move {
            let _ = shutdown_rx.recv().await;
        }
    }

    /// Broadcast shutdown to every subscriber
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal: {}", e);
        }
    }

    /// Start listening for shutdown signals (SIGTERM, SIGINT)
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Stop every connection loop and wait for the registry to drain
    pub async fn shutdown_connection_manager(&self, connection_manager: &ConnectionManager) -> Result<()> {
        info!(
            "Waiting for {} connections to close (timeout: {:?})",
            connection_manager.get_active_connections(),
            self.timeout
        );

        connection_manager.initiate_shutdown();

        if let Err(e) = connection_manager.wait_for_connections_to_close(self.timeout).await {
            warn!("Shutdown timeout reached: {}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionHandle, ConnectionRegistry};
    use crate::metrics::Metrics;
    use futures::stream;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut receiver = coordinator.subscribe();
        let signalled = coordinator.signalled();

        coordinator.trigger();

        assert!(receiver.recv().await.is_ok());
        tokio::time::timeout(Duration::from_secs(1), signalled)
            .await
            .expect("signalled future should resolve");
    }

    #[tokio::test]
    async fn test_shutdown_connection_manager_drains_registry() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(2));
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let manager = Arc::new(ConnectionManager::new(registry, metrics, 8));

        let (handle, _queue) = ConnectionHandle::channel("alice", 8);
        let task_manager = Arc::clone(&manager);
        let task = tokio::spawn(async move {
            let inbound = stream::pending::<std::result::Result<Vec<u8>, String>>();
            task_manager
                .serve_connection("alice".to_string(), handle, inbound)
                .await
        });

        for _ in 0..100 {
            if manager.get_active_connections() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get_active_connections(), 1);

        coordinator.shutdown_connection_manager(&manager).await.unwrap();

        assert_eq!(manager.get_active_connections(), 0);
        assert!(task.await.is_ok());
    }
}
