//! Connection Handle
//!
//! A handle is the shareable, send-side view of one peer connection. Frames
//! handed to [`ConnectionHandle::send`] are pushed onto a bounded queue that a
//! transport writer drains in order; the handle itself never blocks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Errors returned when a frame cannot be handed to a connection
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    #[error("connection is closed")]
    Closed,

    #[error("outbound queue is full")]
    Busy,
}

/// Receiving side of a handle, drained by the transport writer
#[derive(Debug)]
pub struct OutboundQueue {
    /// Frames to write, in send order
    pub frames: mpsc::Receiver<String>,
    /// Fires once when the handle is closed (or dropped)
    pub close: oneshot::Receiver<()>,
}

/// Send-side handle of one peer connection
pub struct ConnectionHandle {
    id: Uuid,
    peer_id: String,
    outbound: mpsc::Sender<String>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    frames_sent: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle together with the queue its writer drains
    pub fn channel(peer_id: impl Into<String>, queue_size: usize) -> (Arc<Self>, OutboundQueue) {
        let (outbound, frames) = mpsc::channel(queue_size.max(1));
        let (close_tx, close) = oneshot::channel();

        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            peer_id: peer_id.into(),
            outbound,
            close_tx: Mutex::new(Some(close_tx)),
            frames_sent: AtomicU64::new(0),
        });

        (handle, OutboundQueue { frames, close })
    }

    /// Unique id of this connection, distinct across reused identifiers
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identifier the peer registered under
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Queue one frame for delivery
    ///
    /// Fails with [`HandleError::Busy`] when the writer has fallen behind and
    /// with [`HandleError::Closed`] once the handle is closed or its writer
    /// has stopped. A failed frame is dropped, never retried.
    pub fn send(&self, frame: String) -> Result<(), HandleError> {
        if self.is_closed() {
            return Err(HandleError::Closed);
        }

        match self.outbound.try_send(frame) {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(HandleError::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HandleError::Closed),
        }
    }

    /// Close the connection
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        match self.close_tx.lock().take() {
            Some(close_tx) => {
                // The writer may already be gone
                let _ = close_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Whether the handle was closed or its writer stopped
    pub fn is_closed(&self) -> bool {
        self.close_tx.lock().is_none() || self.outbound.is_closed()
    }

    /// Number of frames accepted for delivery
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Whether both handles refer to the same connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer_id", &self.peer_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
