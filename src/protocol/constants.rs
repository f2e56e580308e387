//! Signaling Protocol Constants

// Reserved heartbeat class, never forwarded
pub const MSG_TYPE_PING: &str = "PING";

// Request path prefix; the remainder of the path is the peer identifier
pub const PEER_PATH_PREFIX: &str = "/usr/";
