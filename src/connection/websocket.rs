//! WebSocket Transport
//!
//! Splits an upgraded socket into a [`ConnectionHandle`] backed by a writer
//! task and a stream of inbound frame payloads.

use std::future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::handle::{ConnectionHandle, OutboundQueue};

/// Attach a handle and a writer task to an upgraded socket
///
/// Returns the handle, the inbound payload stream, and the writer task. The
/// writer ends when the handle is closed, when it is dropped, or when a write
/// fails.
pub fn attach(
    socket: WebSocket,
    peer_id: &str,
    queue_size: usize,
) -> (
    Arc<ConnectionHandle>,
    impl Stream<Item = Result<Vec<u8>, axum::Error>> + Unpin + Send,
    JoinHandle<()>,
) {
    let (sink, stream) = socket.split();
    let (handle, queue) = ConnectionHandle::channel(peer_id, queue_size);

    let writer = tokio::spawn(write_loop(sink, queue, peer_id.to_string()));

    (handle, inbound_frames(stream), writer)
}

/// Text and binary frames carry envelopes; ping/pong stay at the transport
/// level and a close frame ends the stream
fn inbound_frames(
    stream: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<Vec<u8>, axum::Error>> + Unpin + Send {
    stream
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.into_bytes())),
                Ok(Message::Binary(data)) => Some(Ok(data)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
                Err(e) => Some(Err(e)),
            })
        })
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, queue: OutboundQueue, peer_id: String) {
    let OutboundQueue { frames, mut close } = queue;
    let mut frames = ReceiverStream::new(frames);

    loop {
        tokio::select! {
            biased;
            _ = &mut close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = frames.next() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        debug!(peer_id = %peer_id, error = %e, "Write failed, stopping writer");
                        break;
                    }
                }
                None => break,
            }
        }
    }

    let _ = sink.close().await;
    debug!(peer_id = %peer_id, "Writer stopped");
}
