//! HTTP Server Module
//! 
//! WebSocket upgrade endpoint for peers plus the count, health, metrics and
//! page routes.

pub mod api;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::RelayApi;
pub use handlers::AppState;
pub use server::RelayServer;
pub use types::*;
