//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub website: WebsiteConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Largest inbound WebSocket message accepted, in bytes
    pub max_message_size: usize,
    /// Frames queued per connection before sends to it fail
    pub outbound_queue_size: usize,
}

/// Home page, test pages and static files
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebsiteConfig {
    pub enabled: bool,
    pub page_dir: PathBuf,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            shutdown_timeout: Duration::from_secs(10),
            max_message_size: 64 * 1024,
            outbound_queue_size: 64,
        }
    }
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_dir: PathBuf::from("./page"),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
