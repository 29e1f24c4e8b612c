//! Outbound side of one peer connection.
//!
//! Multiple components (chat fan-out, presence broadcaster, the handler
//! itself) may want to write to the same peer concurrently. All writes are
//! funneled through a bounded channel into a single writer task that owns
//! the WebSocket sink, so frames to one peer are serialized and never
//! interleaved.

use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::RelayError;
use crate::protocol::ServerEvent;

/// Clonable handle for pushing events to one peer.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<ServerEvent>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Enqueue an event for serialization to the peer.
    ///
    /// Never blocks: the outbound buffer is bounded, and a full or closed
    /// buffer means the peer is stalled or gone.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::PeerUnreachable` when the event cannot be
    /// enqueued. The caller must treat the session as dead.
    pub fn send(&self, event: ServerEvent) -> Result<(), RelayError> {
        if self.closed.is_cancelled() {
            return Err(RelayError::PeerUnreachable);
        }
        self.tx
            .try_send(event)
            .map_err(|_| RelayError::PeerUnreachable)
    }

    /// Force-close the connection: stops the writer task and wakes the
    /// owning handler. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token that fires when the connection is closed from either side.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Create a connection handle together with the receiving end its writer
/// task drains. Also used directly by unit tests to observe outbound
/// traffic without a socket.
pub fn connection_channel(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = ConnectionHandle {
        tx,
        closed: CancellationToken::new(),
    };
    (handle, rx)
}

/// Spawn the single writer task for one peer.
///
/// Drains the outbound channel, serializes each event to one JSON text
/// frame and pushes it to the sink. Exits when the connection is closed or
/// the sink errors; a sink error also cancels the close token so the
/// owning handler wakes up.
pub fn spawn_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerEvent>,
    closed: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("failed to serialize outbound event: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        closed.cancel();
                        break;
                    }
                }
            }
        }
        // Best-effort close frame; the peer may already be gone.
        let _ = sink.send(Message::Close(None)).await;
    })
}
