//! Per-connection handler: the relay's event state machine.
//!
//! Each accepted connection gets one handler task that walks through three
//! phases: AWAITING_LOGIN (only a login declaration is meaningful),
//! ACTIVE (exhaustive dispatch of the wire events) and TERMINATING
//! (idempotent teardown). Every error on this connection stays in this
//! handler; one peer's failure never affects the others.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use futures_util::stream::SplitStream;

use crate::domain::{RoomId, UserStatus};
use crate::protocol::{ClientEvent, HistoryEntry, ServerEvent};

use super::connection::{ConnectionHandle, connection_channel, spawn_writer};
use super::presence::ensure_presence_task;
use super::registry::SessionHandle;
use super::router::{fan_out, recipients_for};
use super::state::RelayState;

/// Whether the active loop keeps reading after an event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Own one connection's lifecycle from accept to teardown.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, addr: SocketAddr) {
    let (sink, mut receiver) = socket.split();
    let (conn, outbound_rx) = connection_channel(state.config.outbound_buffer);
    let writer = spawn_writer(sink, outbound_rx, conn.closed_token());

    tracing::info!("peer @{} connected", addr);

    let Some(handle) = await_login(&state, &mut receiver, &conn, addr).await else {
        conn.close();
        let _ = writer.await;
        tracing::info!("peer @{} disconnected without logging in", addr);
        return;
    };

    active_loop(&state, &mut receiver, &conn, &handle, addr).await;

    // Teardown runs exactly once per session: `remove_session` only
    // notifies if this call actually removed the registry entry.
    state.remove_session(&handle).await;
    conn.close();
    let _ = writer.await;
    tracing::info!("handler for '{}' @{} exited", handle.identity(), addr);
}

/// AWAITING_LOGIN: read frames until a valid login declaration arrives.
///
/// Any other event type in this state is dropped and logged, never fatal.
/// Returns `None` if the peer quit or the link closed first.
async fn await_login(
    state: &Arc<RelayState>,
    receiver: &mut SplitStream<WebSocket>,
    conn: &ConnectionHandle,
    addr: SocketAddr,
) -> Option<SessionHandle> {
    let closed = conn.closed_token();
    loop {
        let frame = tokio::select! {
            _ = state.shutdown.cancelled() => return None,
            _ = closed.cancelled() => return None,
            frame = receiver.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!("read error from @{} before login: {}", addr, e);
                return None;
            }
        };
        let event = match ClientEvent::decode(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("dropping malformed frame from @{}: {}", addr, e);
                continue;
            }
        };
        match event {
            ClientEvent::Login { identity, room } => {
                if !state.auth.identity_exists(&identity).await {
                    tracing::warn!("rejected login for unknown identity '{}' @{}", identity, addr);
                    continue;
                }
                let handle = state
                    .registry
                    .register(identity.clone(), conn.clone(), room)
                    .await;
                tracing::info!("'{}' @{} joined the session in room {}", identity, addr, room);
                announce_join(state, &handle, room).await;
                prime_room(state, conn, room).await;
                return Some(handle);
            }
            ClientEvent::Quit { .. } => return None,
            other => {
                tracing::warn!(
                    "dropping '{}' event from @{} received before login",
                    other.kind(),
                    addr
                );
            }
        }
    }
}

/// ACTIVE: dispatch inbound events until logout, link failure or shutdown.
async fn active_loop(
    state: &Arc<RelayState>,
    receiver: &mut SplitStream<WebSocket>,
    conn: &ConnectionHandle,
    handle: &SessionHandle,
    addr: SocketAddr,
) {
    let closed = conn.closed_token();
    loop {
        let frame = tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = closed.cancelled() => return,
            frame = receiver.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                if dispatch(state, handle, conn, addr, &text).await == Flow::Stop {
                    return;
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!("read error from '{}' @{}: {}", handle.identity(), addr, e);
                return;
            }
        }
    }
}

/// Dispatch one decoded inbound event for an active session.
pub(crate) async fn dispatch(
    state: &Arc<RelayState>,
    handle: &SessionHandle,
    conn: &ConnectionHandle,
    addr: SocketAddr,
    text: &str,
) -> Flow {
    let event = match ClientEvent::decode(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                "dropping malformed frame from '{}' @{}: {}",
                handle.identity(),
                addr,
                e
            );
            return Flow::Continue;
        }
    };
    state.registry.touch(handle).await;

    match event {
        ClientEvent::Chat { room, text, .. } => relay_chat(state, handle, conn, addr, room, text).await,
        ClientEvent::Typing { .. } => {
            relay_typing(state, handle).await;
            Flow::Continue
        }
        ClientEvent::SetStatus { status, .. } => {
            match status.parse::<UserStatus>() {
                Ok(status) => {
                    state.registry.set_status(handle, status).await;
                    tracing::debug!("'{}' is now {}", handle.identity(), status);
                }
                Err(e) => {
                    // Prior status stays untouched.
                    tracing::warn!("rejected status change for '{}': {}", handle.identity(), e);
                }
            }
            Flow::Continue
        }
        ClientEvent::JoinRoom { room, .. } => {
            state.registry.set_room(handle, room).await;
            tracing::info!("'{}' moved to room {}", handle.identity(), room);
            prime_room(state, conn, room).await;
            Flow::Continue
        }
        ClientEvent::Logout { .. } => {
            tracing::info!("'{}' logged out", handle.identity());
            Flow::Stop
        }
        ClientEvent::Quit { .. } => {
            tracing::info!("'{}' quit", handle.identity());
            Flow::Stop
        }
        ClientEvent::Login { .. } => {
            tracing::warn!("'{}' sent a second login on the same connection, ignoring", handle.identity());
            Flow::Continue
        }
    }
}

/// Relay one chat line: persist, fan out to the room, acknowledge the
/// sender.
async fn relay_chat(
    state: &Arc<RelayState>,
    handle: &SessionHandle,
    conn: &ConnectionHandle,
    addr: SocketAddr,
    room: RoomId,
    text: String,
) -> Flow {
    // Persistence failures are reported but never block relay: the message
    // still reaches live recipients.
    if let Err(e) = state
        .store
        .record_message(handle.identity(), room, &text, &addr.to_string())
        .await
    {
        tracing::error!(
            "failed to persist message from '{}' in room {}: {}",
            handle.identity(),
            room,
            e
        );
    }

    let snapshot = state.registry.snapshot_room(room).await;
    let recipients = recipients_for(&snapshot, handle.identity());
    let event = ServerEvent::Chat {
        identity: handle.identity().clone(),
        room,
        text: text.clone(),
    };
    for dead in fan_out(&recipients, &event) {
        state.remove_session(&dead).await;
    }

    // The sender always gets either delivery or an explicit failure for
    // its own message, never a silent drop.
    let ack = ServerEvent::Ack {
        text: format!("{}: {}", handle.identity(), text),
    };
    if conn.send(ack).is_err() {
        tracing::warn!(
            "could not acknowledge '{}', treating the peer as gone",
            handle.identity()
        );
        return Flow::Stop;
    }
    Flow::Continue
}

/// Forward a typing signal to the session's current room. Nothing is
/// persisted.
async fn relay_typing(state: &Arc<RelayState>, handle: &SessionHandle) {
    let Some(room) = state.registry.room_of(handle).await else {
        return;
    };
    let snapshot = state.registry.snapshot_room(room).await;
    let recipients = recipients_for(&snapshot, handle.identity());
    let event = ServerEvent::Typing {
        identity: handle.identity().clone(),
    };
    for dead in fan_out(&recipients, &event) {
        state.remove_session(&dead).await;
    }
}

/// Tell the other room members a session joined.
async fn announce_join(state: &Arc<RelayState>, handle: &SessionHandle, room: RoomId) {
    let snapshot = state.registry.snapshot_room(room).await;
    let recipients = recipients_for(&snapshot, handle.identity());
    let notice = ServerEvent::Notice {
        text: format!("{} has joined the session", handle.identity()),
    };
    for dead in fan_out(&recipients, &notice) {
        state.remove_session(&dead).await;
    }
}

/// Room-join side effects: bump the visit counter, prime the client with
/// recent history and make sure the room's presence broadcaster runs.
async fn prime_room(state: &Arc<RelayState>, conn: &ConnectionHandle, room: RoomId) {
    if let Err(e) = state.store.record_room_join(room).await {
        tracing::warn!("failed to record visit for room {}: {}", room, e);
    }
    send_history(state, conn, room).await;
    ensure_presence_task(state, room).await;
}

async fn send_history(state: &Arc<RelayState>, conn: &ConnectionHandle, room: RoomId) {
    let messages = match state
        .store
        .load_recent_messages(room, state.config.history_limit)
        .await
    {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!("could not load history for room {}: {}", room, e);
            return;
        }
    };
    if messages.is_empty() {
        return;
    }
    let entries: Vec<HistoryEntry> = messages
        .into_iter()
        .map(|m| HistoryEntry {
            identity: m.identity,
            text: m.text,
        })
        .collect();
    let history = ServerEvent::History {
        room,
        messages: entries,
    };
    if conn.send(history).is_err() {
        conn.close();
    }
}
