//! Metrics Collector

use std::time::Duration;

use anyhow::Context;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

use crate::Result;

/// Collects and exports relay metrics
///
/// Each instance owns its own Prometheus registry, so independent relays (and
/// tests) never share counters.
pub struct Metrics {
    prometheus_registry: Registry,

    connections_total: IntCounter,
    active_connections: IntGauge,
    connection_duration: Histogram,
    messages_forwarded_total: IntCounter,
    messages_dropped_total: IntCounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let connections_total = IntCounter::new(
            "sigrelay_connections_total",
            "Total number of peer connections registered",
        )
        .context("Failed to create connections_total counter")?;

        let active_connections = IntGauge::new(
            "sigrelay_active_connections",
            "Number of currently connected peers",
        )
        .context("Failed to create active_connections gauge")?;

        let connection_duration = Histogram::with_opts(
            HistogramOpts::new(
                "sigrelay_connection_duration_seconds",
                "Lifetime of peer connections in seconds",
            )
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]),
        )
        .context("Failed to create connection_duration histogram")?;

        let messages_forwarded_total = IntCounter::new(
            "sigrelay_messages_forwarded_total",
            "Envelopes handed to a recipient connection",
        )
        .context("Failed to create messages_forwarded_total counter")?;

        let messages_dropped_total = IntCounterVec::new(
            Opts::new(
                "sigrelay_messages_dropped_total",
                "Envelopes dropped instead of forwarded",
            ),
            &["reason"],
        )
        .context("Failed to create messages_dropped_total counter")?;

        prometheus_registry
            .register(Box::new(connections_total.clone()))
            .context("Failed to register connections_total")?;
        prometheus_registry
            .register(Box::new(active_connections.clone()))
            .context("Failed to register active_connections")?;
        prometheus_registry
            .register(Box::new(connection_duration.clone()))
            .context("Failed to register connection_duration")?;
        prometheus_registry
            .register(Box::new(messages_forwarded_total.clone()))
            .context("Failed to register messages_forwarded_total")?;
        prometheus_registry
            .register(Box::new(messages_dropped_total.clone()))
            .context("Failed to register messages_dropped_total")?;

        Ok(Self {
            prometheus_registry,
            connections_total,
            active_connections,
            connection_duration,
            messages_forwarded_total,
            messages_dropped_total,
        })
    }

    /// Record a newly registered connection
    pub fn connection_opened(&self) {
        self.connections_total.inc();
        self.active_connections.inc();
    }

    /// Record a connection that has been unregistered and closed
    pub fn connection_closed(&self, lifetime: Duration) {
        self.active_connections.dec();
        self.connection_duration.observe(lifetime.as_secs_f64());
    }

    /// Record a forwarded envelope
    pub fn message_forwarded(&self) {
        self.messages_forwarded_total.inc();
    }

    /// Record a dropped envelope
    pub fn message_dropped(&self, reason: &str) {
        self.messages_dropped_total.with_label_values(&[reason]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }

    /// Total connections registered since startup
    pub fn get_total_connections(&self) -> u64 {
        self.connections_total.get()
    }

    /// Connections currently open
    pub fn get_active_connections(&self) -> i64 {
        self.active_connections.get()
    }

    /// Envelopes forwarded since startup
    pub fn get_messages_forwarded(&self) -> u64 {
        self.messages_forwarded_total.get()
    }

    /// Envelopes dropped for `reason` since startup
    pub fn get_messages_dropped(&self, reason: &str) -> u64 {
        self.messages_dropped_total.with_label_values(&[reason]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lifecycle_counters() {
        let metrics = Metrics::new().unwrap();

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed(Duration::from_secs(3));

        assert_eq!(metrics.get_total_connections(), 2);
        assert_eq!(metrics.get_active_connections(), 1);
    }

    #[test]
    fn test_message_counters_by_reason() {
        let metrics = Metrics::new().unwrap();

        metrics.message_forwarded();
        metrics.message_dropped("malformed");
        metrics.message_dropped("malformed");
        metrics.message_dropped("unknown_recipient");

        assert_eq!(metrics.get_messages_forwarded(), 1);
        assert_eq!(metrics.get_messages_dropped("malformed"), 2);
        assert_eq!(metrics.get_messages_dropped("unknown_recipient"), 1);
        assert_eq!(metrics.get_messages_dropped("send_failed"), 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new().unwrap();
        metrics.connection_opened();
        metrics.message_dropped("no_recipient");

        let output = metrics.export_prometheus();
        assert!(output.contains("sigrelay_connections_total 1"));
        assert!(output.contains("sigrelay_messages_dropped_total{reason=\"no_recipient\"} 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.message_forwarded();
        assert_eq!(second.get_messages_forwarded(), 0);
    }
}
