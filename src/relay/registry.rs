//! The session registry: single source of truth for presence state.
//!
//! The registry is the only mutable shared state in the relay. Every read
//! and write goes through its API under one lock; no component mutates a
//! session's fields directly. Iterating callers work on point-in-time
//! snapshots so the lock is never held across socket I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Identity, RoomId, UserStatus};

use super::connection::ConnectionHandle;

/// Opaque handle returned by [`SessionRegistry::register`].
///
/// The epoch pins the handle to one registration: once a session has been
/// superseded or removed, operations through a stale handle are no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    identity: Identity,
    epoch: u64,
}

impl SessionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Point-in-time copy of one session, safe to iterate while the registry
/// keeps mutating.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub handle: SessionHandle,
    pub room: RoomId,
    pub status: UserStatus,
    pub last_activity: DateTime<Utc>,
    pub conn: ConnectionHandle,
}

impl SessionSnapshot {
    pub fn identity(&self) -> &Identity {
        self.handle.identity()
    }
}

/// What `unregister` removed: enough to build the departure notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartedSession {
    pub identity: Identity,
    pub room: RoomId,
}

struct SessionEntry {
    epoch: u64,
    conn: ConnectionHandle,
    room: RoomId,
    status: UserStatus,
    last_activity: DateTime<Utc>,
}

/// Concurrency-safe map of connected identities to their connection, room
/// and status.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Identity, SessionEntry>>,
    next_epoch: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, atomically superseding any live session for the
    /// same identity (last-writer-wins). The superseded connection is
    /// force-closed so at most one socket per identity stays live.
    pub async fn register(
        &self,
        identity: Identity,
        conn: ConnectionHandle,
        room: RoomId,
    ) -> SessionHandle {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let entry = SessionEntry {
            epoch,
            conn,
            room,
            status: UserStatus::Online,
            last_activity: Utc::now(),
        };
        let superseded = {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(identity.clone(), entry)
        };
        if let Some(old) = superseded {
            tracing::info!(
                "identity '{}' logged in again, superseding its previous session",
                identity
            );
            old.conn.close();
        }
        SessionHandle { identity, epoch }
    }

    /// Update the session's room. Stale handles are ignored.
    pub async fn set_room(&self, handle: &SessionHandle, room: RoomId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(&handle.identity)
            && entry.epoch == handle.epoch
        {
            entry.room = room;
        }
    }

    /// Update the session's status. Stale handles are ignored. Status
    /// validation happens at the protocol boundary; by the time a
    /// `UserStatus` exists it is one of the four accepted values.
    pub async fn set_status(&self, handle: &SessionHandle, status: UserStatus) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(&handle.identity)
            && entry.epoch == handle.epoch
        {
            entry.status = status;
        }
    }

    /// Refresh the session's last-activity timestamp.
    pub async fn touch(&self, handle: &SessionHandle) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(&handle.identity)
            && entry.epoch == handle.epoch
        {
            entry.last_activity = Utc::now();
        }
    }

    /// Remove the session. Idempotent: `None` means the handle was already
    /// gone (removed earlier, or superseded by a newer login).
    pub async fn unregister(&self, handle: &SessionHandle) -> Option<DepartedSession> {
        let mut sessions = self.sessions.lock().await;
        let is_live = sessions
            .get(&handle.identity)
            .is_some_and(|entry| entry.epoch == handle.epoch);
        if !is_live {
            return None;
        }
        let entry = sessions.remove(&handle.identity)?;
        Some(DepartedSession {
            identity: handle.identity.clone(),
            room: entry.room,
        })
    }

    /// Consistent point-in-time copy of every session in a room, ordered by
    /// identity for deterministic iteration.
    pub async fn snapshot_room(&self, room: RoomId) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.lock().await;
        let mut snapshot: Vec<SessionSnapshot> = sessions
            .iter()
            .filter(|(_, entry)| entry.room == room)
            .map(|(identity, entry)| SessionSnapshot {
                handle: SessionHandle {
                    identity: identity.clone(),
                    epoch: entry.epoch,
                },
                room: entry.room,
                status: entry.status,
                last_activity: entry.last_activity,
                conn: entry.conn.clone(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.identity().cmp(b.identity()));
        snapshot
    }

    /// Current room of the session, if it is still live.
    pub async fn room_of(&self, handle: &SessionHandle) -> Option<RoomId> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&handle.identity)
            .filter(|entry| entry.epoch == handle.epoch)
            .map(|entry| entry.room)
    }

    /// Current status of an identity, if connected.
    pub async fn status_of(&self, identity: &Identity) -> Option<UserStatus> {
        let sessions = self.sessions.lock().await;
        sessions.get(identity).map(|entry| entry.status)
    }

    pub async fn contains(&self, identity: &Identity) -> bool {
        self.sessions.lock().await.contains_key(identity)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
