//! Envelope Router

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, trace, warn};

use crate::connection::{ConnectionRegistry, HandleError};
use crate::metrics::Metrics;
use crate::protocol::Envelope;

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the recipient's connection
    Forwarded { to: String },
    /// Heartbeat, intentionally not forwarded
    Heartbeat,
    /// Frame did not decode as an envelope
    Malformed,
    /// Envelope named no recipient
    NoRecipient,
    /// Recipient is not connected
    UnknownRecipient { to: String },
    /// Recipient is connected but the frame could not be queued
    SendFailed { to: String, error: HandleError },
}

impl RouteOutcome {
    /// Label used when the frame was dropped, `None` when it was not
    pub fn drop_reason(&self) -> Option<&'static str> {
        match self {
            RouteOutcome::Forwarded { .. } | RouteOutcome::Heartbeat => None,
            RouteOutcome::Malformed => Some("malformed"),
            RouteOutcome::NoRecipient => Some("no_recipient"),
            RouteOutcome::UnknownRecipient { .. } => Some("unknown_recipient"),
            RouteOutcome::SendFailed { .. } => Some("send_failed"),
        }
    }
}

/// Why a receive loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Peer closed the connection
    Closed,
    /// Receive failed on the transport
    TransportError(String),
    /// Server is shutting down
    Shutdown,
}

/// Per-connection receive loop summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub received: u64,
    pub forwarded: u64,
    pub heartbeats: u64,
    pub dropped: u64,
    pub exit: LoopExit,
}

impl LoopSummary {
    fn new() -> Self {
        Self {
            received: 0,
            forwarded: 0,
            heartbeats: 0,
            dropped: 0,
            exit: LoopExit::Closed,
        }
    }

    /// Summary for a connection refused before its loop started
    pub(crate) fn rejected() -> Self {
        Self {
            exit: LoopExit::Shutdown,
            ..Self::new()
        }
    }

    fn record(&mut self, outcome: &RouteOutcome) {
        self.received += 1;
        match outcome {
            RouteOutcome::Forwarded { .. } => self.forwarded += 1,
            RouteOutcome::Heartbeat => self.heartbeats += 1,
            _ => self.dropped += 1,
        }
    }
}

/// Routes envelopes from one connection to the registered recipient
#[derive(Clone)]
pub struct Router {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
}

impl Router {
    /// Create a new router over `registry`
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    /// Route one raw frame received from `peer_id`
    ///
    /// The forwarded envelope always carries `peer_id` as its sender,
    /// whatever the frame declared.
    pub fn route(&self, peer_id: &str, raw: &[u8]) -> RouteOutcome {
        let outcome = self.dispatch(peer_id, raw);

        match outcome.drop_reason() {
            Some(reason) => self.metrics.message_dropped(reason),
            None if matches!(outcome, RouteOutcome::Forwarded { .. }) => {
                self.metrics.message_forwarded()
            }
            None => {}
        }

        outcome
    }

    fn dispatch(&self, peer_id: &str, raw: &[u8]) -> RouteOutcome {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(peer_id = %peer_id, error = %e, "Dropping malformed envelope");
                return RouteOutcome::Malformed;
            }
        };

        if envelope.is_heartbeat() {
            trace!(peer_id = %peer_id, "Heartbeat");
            return RouteOutcome::Heartbeat;
        }

        if !envelope.has_recipient() {
            debug!(peer_id = %peer_id, msg_type = %envelope.kind, "Dropping envelope without recipient");
            return RouteOutcome::NoRecipient;
        }

        let target = match self.registry.lookup(&envelope.recipient) {
            Some(target) => target,
            None => {
                info!(peer_id = %peer_id, to = %envelope.recipient, "Recipient does not exist");
                return RouteOutcome::UnknownRecipient {
                    to: envelope.recipient,
                };
            }
        };

        let to = envelope.recipient.clone();
        let frame = match envelope.forwarded_from(peer_id).encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(peer_id = %peer_id, to = %to, error = %e, "Failed to encode envelope");
                return RouteOutcome::Malformed;
            }
        };

        match target.send(frame) {
            Ok(()) => {
                trace!(peer_id = %peer_id, to = %to, "Forwarded envelope");
                RouteOutcome::Forwarded { to }
            }
            Err(error) => {
                warn!(peer_id = %peer_id, to = %to, connection_id = %target.id(), error = %error, "Send message failed");
                RouteOutcome::SendFailed { to, error }
            }
        }
    }

    /// Run the receive loop for `peer_id` until its inbound stream ends,
    /// fails, or `shutdown` resolves
    ///
    /// Nothing received from one peer (malformed frames included) stops the
    /// loop; only the peer's own connection ending does.
    pub async fn run<S, E, F>(&self, peer_id: &str, mut inbound: S, shutdown: F) -> LoopSummary
    where
        S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: fmt::Display,
        F: Future<Output = ()>,
    {
        let mut summary = LoopSummary::new();
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let frame = tokio::select! {
                frame = inbound.next() => frame,
                _ = &mut shutdown => {
                    debug!(peer_id = %peer_id, "Receive loop interrupted by shutdown");
                    summary.exit = LoopExit::Shutdown;
                    break;
                }
            };

            match frame {
                Some(Ok(raw)) => {
                    let outcome = self.route(peer_id, &raw);
                    summary.record(&outcome);
                }
                Some(Err(e)) => {
                    warn!(peer_id = %peer_id, error = %e, "Error receiving message");
                    summary.exit = LoopExit::TransportError(e.to_string());
                    break;
                }
                None => {
                    summary.exit = LoopExit::Closed;
                    break;
                }
            }
        }

        summary
    }
}
