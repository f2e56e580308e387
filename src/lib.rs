//! sigrelay Library
//! 
//! WebSocket signaling relay: peers connect under a self-declared identifier
//! and exchange small JSON envelopes addressed to other identifiers. The relay
//! keeps a live directory of connected identifiers and forwards each envelope
//! to its recipient, or drops it when the recipient is not connected.

pub mod config;
pub mod connection;
pub mod metrics;
pub mod protocol;
pub mod routing;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionRegistry};
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay
pub type Result<T> = anyhow::Result<T>;
