//! sigrelay - WebSocket Signaling Relay
//!
//! Peers connect to `/usr/<identifier>` and exchange JSON envelopes addressed
//! to each other's identifiers.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sigrelay::{
    config::ConfigManager, metrics::Metrics, Config, ConnectionManager, ConnectionRegistry,
    RelayServer, ShutdownCoordinator,
};

/// CLI arguments for sigrelay
#[derive(Parser, Debug)]
#[command(name = "sigrelay")]
#[command(about = "sigrelay - WebSocket signaling relay")]
#[command(version)]
#[command(long_about = "
sigrelay - WebSocket signaling relay

Peers connect to ws://<host>:<port>/usr/<identifier> and send JSON envelopes
  {\"msg_type\": ..., \"message\": ..., \"from\": ..., \"to\": ...}
which are forwarded to the peer registered under \"to\".

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SIGRELAY_BIND_ADDR         - Bind address (e.g., 0.0.0.0:8080)
  SIGRELAY_PORT              - Port to listen on
  SIGRELAY_WEBSITE           - Serve pages and static files (true/false)
  SIGRELAY_PAGE_DIR          - Directory holding the pages
  SIGRELAY_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
  SIGRELAY_SHUTDOWN_TIMEOUT  - Connection drain timeout (e.g., 10s)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "sigrelay.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Port number to run the server on (overrides config file)
    #[arg(short, long, help = "Port number to run server")]
    pub port: Option<u16>,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 127.0.0.1:8080)")]
    pub bind: Option<String>,

    /// Enable/disable the html pages (overrides config file)
    #[arg(short = 'w', long, help = "Enable/Disable the html pages (true/false)")]
    pub website: Option<bool>,

    /// Directory holding index.html, the test pages and static files
    #[arg(long, help = "Directory holding the html pages")]
    pub page_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level (overrides config file)")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let config_from_file = args.config.exists();
    let mut config = if config_from_file {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.website,
        args.page_dir.as_deref(),
    );
    if let Some(log_level) = &args.log_level {
        config.monitoring.log_level = log_level.clone();
    }

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config)?;

    info!(
        "Starting sigrelay v{} - WebSocket signaling relay",
        env!("CARGO_PKG_VERSION")
    );
    if config_from_file {
        info!("Configuration loaded from {}", args.config.display());
    } else {
        info!("Config file not found, using environment variables and defaults");
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  Max message size: {} bytes", config.server.max_message_size);
        info!("  Outbound queue size: {}", config.server.outbound_queue_size);
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        info!(
            "  Website: {}",
            if config.website.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        info!("  Page directory: {}", config.website.page_dir.display());
        info!(
            "  Metrics: {}",
            if config.monitoring.metrics_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    let config = Arc::new(config);
    let registry = Arc::new(ConnectionRegistry::new());
    let metrics = Arc::new(Metrics::new()?);
    let connection_manager = Arc::new(ConnectionManager::from_config(
        &config,
        registry,
        Arc::clone(&metrics),
    ));
    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let server = RelayServer::new(Arc::clone(&config), Arc::clone(&connection_manager), metrics);
    let listener = server.bind().await?;

    info!("Server started at port: {}", config.server.bind_addr.port());
    info!("Website mode: {}", config.website.enabled);

    let mut server_handle = tokio::spawn(server.serve(listener, shutdown_coordinator.signalled()));

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => warn!("Server stopped before a shutdown signal"),
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task failed: {}", e),
            }
            return Ok(());
        }
        signal_result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = signal_result {
                error!("Error setting up signal handlers: {}", e);
                shutdown_coordinator.trigger();
            }
        }
    }

    info!("Initiating graceful shutdown...");

    shutdown_coordinator
        .shutdown_connection_manager(&connection_manager)
        .await?;

    if let Err(e) = server_handle.await {
        if !e.is_cancelled() {
            error!("Server task failed: {}", e);
        }
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        config.monitoring.log_level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
