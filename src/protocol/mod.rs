//! Wire protocol: closed tagged-variant event types.
//!
//! Each event travels as one self-delimited JSON text frame, internally
//! tagged by `type`. Framing and deframing belong to the connection layer;
//! the handler state machine only ever sees fully decoded events and
//! matches them exhaustively.

use serde::{Deserialize, Serialize};

use crate::domain::{Identity, RelayError, RoomId, UserStatus};

/// Events a client may send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Login declaration: identity plus initial room. Must be the first
    /// meaningful event on a connection.
    Login { identity: Identity, room: RoomId },
    /// Explicit logout; the connection stays open for teardown frames.
    Logout { identity: Identity },
    /// Client is quitting entirely. An absent identity means the client
    /// never logged in.
    Quit { identity: Option<Identity> },
    /// One chat line for the sender's room. `source` is advisory; the relay
    /// records the address it actually observed on the socket.
    Chat {
        identity: Identity,
        room: RoomId,
        text: String,
        #[serde(default)]
        source: Option<String>,
    },
    /// Momentary typing signal. No payload beyond the identity.
    Typing { identity: Identity },
    /// Status-change declaration. Travels as a raw string so unknown values
    /// can be rejected server-side with `InvalidStatus`.
    SetStatus { identity: Identity, status: String },
    /// Room-change declaration.
    JoinRoom { identity: Identity, room: RoomId },
}

impl ClientEvent {
    /// Decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::MalformedEvent` for undecodable input. The
    /// caller drops the frame and logs; malformed input is never fatal.
    pub fn decode(frame: &str) -> Result<Self, RelayError> {
        serde_json::from_str(frame).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }

    /// Short event kind name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Login { .. } => "login",
            ClientEvent::Logout { .. } => "logout",
            ClientEvent::Quit { .. } => "quit",
            ClientEvent::Chat { .. } => "chat",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::SetStatus { .. } => "set_status",
            ClientEvent::JoinRoom { .. } => "join_room",
        }
    }
}

/// Events the relay pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat line relayed from another session in the same room.
    Chat {
        identity: Identity,
        room: RoomId,
        text: String,
    },
    /// Another session in the room is typing.
    Typing { identity: Identity },
    /// Full point-in-time roster for a room, including the receiver.
    Presence {
        room: RoomId,
        members: Vec<PresenceMember>,
    },
    /// Delivery acknowledgement echoed back to a chat sender.
    Ack { text: String },
    /// Recent room history, oldest first. Sent once at room-join time.
    History {
        room: RoomId,
        messages: Vec<HistoryEntry>,
    },
    /// Session-level notification, e.g. "alice has left the session".
    Notice { text: String },
}

/// One roster entry in a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub identity: Identity,
    pub status: UserStatus,
}

/// One line of primed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub identity: Identity,
    pub text: String,
}
