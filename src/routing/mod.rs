//! Routing Module
//! 
//! Per-connection receive loop and envelope forwarding decisions.

pub mod router;

pub use router::{LoopExit, LoopSummary, RouteOutcome, Router};
