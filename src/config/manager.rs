//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{Context, bail};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable names
pub const ENV_BIND_ADDR: &str = "SIGRELAY_BIND_ADDR";
pub const ENV_PORT: &str = "SIGRELAY_PORT";
pub const ENV_WEBSITE: &str = "SIGRELAY_WEBSITE";
pub const ENV_PAGE_DIR: &str = "SIGRELAY_PAGE_DIR";
pub const ENV_LOG_LEVEL: &str = "SIGRELAY_LOG_LEVEL";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "SIGRELAY_SHUTDOWN_TIMEOUT";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any variable source
    pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup(ENV_BIND_ADDR) {
            config.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid {}: {}", ENV_BIND_ADDR, bind_addr))?;
        }

        if let Some(port) = lookup(ENV_PORT) {
            let port = port.parse::<u16>()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
            config.server.bind_addr.set_port(port);
        }

        if let Some(website) = lookup(ENV_WEBSITE) {
            config.website.enabled = website.parse::<bool>()
                .with_context(|| format!("Invalid {}: {}", ENV_WEBSITE, website))?;
        }

        if let Some(page_dir) = lookup(ENV_PAGE_DIR) {
            config.website.page_dir = PathBuf::from(page_dir);
        }

        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            config.monitoring.log_level = log_level;
        }

        if let Some(timeout) = lookup(ENV_SHUTDOWN_TIMEOUT) {
            config.server.shutdown_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid {}: {}", ENV_SHUTDOWN_TIMEOUT, timeout))?;
        }

        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_website_config()
            .with_context(|| "Website configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    /// Validate server configuration
    fn validate_server_config(&self) -> Result<()> {
        if self.server.max_message_size < 1024 {
            bail!("max_message_size must be at least 1024 bytes");
        }

        if self.server.max_message_size > 16 * 1024 * 1024 {
            bail!("max_message_size cannot exceed 16MB");
        }

        if self.server.outbound_queue_size == 0 {
            bail!("outbound_queue_size must be greater than 0");
        }

        if self.server.outbound_queue_size > 65536 {
            bail!("outbound_queue_size cannot exceed 65536");
        }

        if self.server.shutdown_timeout.as_secs() > 300 {
            bail!("shutdown_timeout cannot exceed 5 minutes");
        }

        Ok(())
    }

    /// Validate website configuration
    fn validate_website_config(&self) -> Result<()> {
        if self.website.enabled && self.website.page_dir.as_os_str().is_empty() {
            bail!("website.page_dir must be set when the website is enabled");
        }

        Ok(())
    }

    /// Validate monitoring configuration
    fn validate_monitoring_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", VALID_LOG_LEVELS.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        website: Option<bool>,
        page_dir: Option<&Path>,
    ) {
        // Override bind address if provided
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        // Override port if provided
        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(enabled) = website {
            self.website.enabled = enabled;
            tracing::info!("CLI override: website {}", if enabled { "enabled" } else { "disabled" });
        }

        if let Some(dir) = page_dir {
            self.website.page_dir = dir.to_path_buf();
            tracing::info!("CLI override: page directory set to {}", dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_addr.port(), 8080);
        assert!(config.website.enabled);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_addr = "127.0.0.1:9000"
shutdown_timeout = "3s"

[website]
enabled = false
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.server.outbound_queue_size, 64);
        assert!(!config.website.enabled);
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ConfigManager::load_from_file(Path::new("/nonexistent/sigrelay.toml")).unwrap();
        assert_eq!(config.server.bind_addr.port(), 8080);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[monitoring]\nlog_level = \"loud\"").unwrap();

        assert!(ConfigManager::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_PORT, "9100"),
            (ENV_WEBSITE, "false"),
            (ENV_SHUTDOWN_TIMEOUT, "2s"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        ConfigManager::apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind_addr.port(), 9100);
        assert!(!config.website.enabled);
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_env_override_rejects_bad_port() {
        let mut config = Config::default();
        let result = ConfigManager::apply_env_overrides(&mut config, |key| {
            (key == ENV_PORT).then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_limits() {
        let mut config = Config::default();
        config.server.outbound_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.max_message_size = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.shutdown_timeout = Duration::from_secs(3600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some("127.0.0.1:7000"), Some(7001), Some(false), None);

        assert_eq!(config.server.bind_addr, "127.0.0.1:7001".parse().unwrap());
        assert!(!config.website.enabled);

        // Invalid bind address is ignored
        config.merge_with_cli_args(Some("nonsense"), None, None, Some(Path::new("/srv/page")));
        assert_eq!(config.server.bind_addr, "127.0.0.1:7001".parse().unwrap());
        assert_eq!(config.website.page_dir, PathBuf::from("/srv/page"));
    }
}
