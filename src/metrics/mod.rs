//! Metrics Module
//! 
//! Relay counters exported in the Prometheus text format.

pub mod collector;

pub use collector::Metrics;
