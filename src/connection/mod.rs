//! Connection Management Module
//! 
//! Peer connection handles, the identifier registry, and the per-connection
//! lifecycle.

pub mod handle;
pub mod manager;
pub mod registry;
pub mod websocket;

pub use handle::{ConnectionHandle, HandleError, OutboundQueue};
pub use manager::ConnectionManager;
pub use registry::ConnectionRegistry;
