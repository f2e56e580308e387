//! HTTP Response Types

use serde::{Deserialize, Serialize};

/// Registry size, as served by `/count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCount {
    pub no: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: usize,
    pub uptime_seconds: u64,
    pub shutting_down: bool,
    pub version: String,
}
