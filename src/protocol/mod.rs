//! Signaling Protocol
//! 
//! Wire envelope format exchanged between peers and relayed by the router.

pub mod constants;
pub mod envelope;

pub use constants::*;
pub use envelope::{DecodeError, Envelope};
