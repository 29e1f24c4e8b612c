//! Periodic presence broadcasting.
//!
//! One task per currently-occupied room re-snapshots the roster on a fixed
//! interval and pushes the full "who's here" list to every member. Polling
//! is deliberate: a join or leave becomes visible to the rest of the room
//! within one interval, and that staleness bound is accepted instead of
//! event-driven diffing.
//!
//! Task lifecycle: spawned on the first join, ticking while the room has
//! members, retired on the first empty tick. A retired task is never
//! resurrected; the next join spawns a fresh one.

use std::sync::Arc;

use crate::domain::RoomId;
use crate::protocol::{PresenceMember, ServerEvent};

use super::state::RelayState;

/// Spawn a presence broadcaster for the room unless one is already
/// running.
pub async fn ensure_presence_task(state: &Arc<RelayState>, room: RoomId) {
    let mut rooms = state.presence_rooms.lock().await;
    if rooms.contains(&room) {
        return;
    }
    rooms.insert(room);
    drop(rooms);

    tracing::debug!("starting presence broadcaster for room {}", room);
    let state = state.clone();
    tokio::spawn(async move {
        presence_loop(state, room).await;
    });
}

async fn presence_loop(state: Arc<RelayState>, room: RoomId) {
    let mut ticker = tokio::time::interval(state.config.presence_interval);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                state.presence_rooms.lock().await.remove(&room);
                tracing::debug!("presence broadcaster for room {} stopped on shutdown", room);
                return;
            }
            _ = ticker.tick() => {}
        }

        // Hold the room-set lock across the emptiness check so a join that
        // races with retirement either sees the task still registered or
        // spawns a fresh one.
        let mut rooms = state.presence_rooms.lock().await;
        let snapshot = state.registry.snapshot_room(room).await;
        if snapshot.is_empty() {
            rooms.remove(&room);
            tracing::debug!("presence broadcaster for room {} retired", room);
            return;
        }
        drop(rooms);

        let members: Vec<PresenceMember> = snapshot
            .iter()
            .map(|session| PresenceMember {
                identity: session.identity().clone(),
                status: session.status,
            })
            .collect();
        let event = ServerEvent::Presence { room, members };

        // Best-effort push to every member, including the session itself.
        // A stalled peer is removed rather than retried.
        for session in &snapshot {
            if session.conn.send(event.clone()).is_err() {
                session.conn.close();
                state.remove_session(&session.handle).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::{Identity, UserStatus};
    use crate::domain::collaborators::{MockAuthService, MockMessageStore};
    use crate::relay::connection::connection_channel;
    use crate::relay::state::RelayConfig;

    fn test_state(interval_ms: u64) -> Arc<RelayState> {
        let config = RelayConfig {
            presence_interval: Duration::from_millis(interval_ms),
            ..RelayConfig::default()
        };
        Arc::new(RelayState::new(
            config,
            Arc::new(MockAuthService::new()),
            Arc::new(MockMessageStore::new()),
            CancellationToken::new(),
        ))
    }

    fn identity(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    async fn recv_presence(
        rx: &mut tokio::sync::mpsc::Receiver<ServerEvent>,
    ) -> (RoomId, Vec<PresenceMember>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for presence snapshot")
                .expect("connection channel closed");
            if let ServerEvent::Presence { room, members } = event {
                return (room, members);
            }
        }
    }

    #[tokio::test]
    async fn test_roster_reaches_every_member_within_interval() {
        let state = test_state(25);
        let (alice_conn, mut alice_rx) = connection_channel(8);
        let (bob_conn, mut bob_rx) = connection_channel(8);
        let alice = state
            .registry
            .register(identity("alice"), alice_conn, RoomId(1))
            .await;
        state
            .registry
            .register(identity("bob"), bob_conn, RoomId(1))
            .await;
        state.registry.set_status(&alice, UserStatus::Away).await;

        ensure_presence_task(&state, RoomId(1)).await;

        for rx in [&mut alice_rx, &mut bob_rx] {
            let (room, members) = recv_presence(rx).await;
            assert_eq!(room, RoomId(1));
            assert_eq!(members.len(), 2);
            // Full roster including self, tagged with each member's status.
            assert_eq!(members[0].identity, identity("alice"));
            assert_eq!(members[0].status, UserStatus::Away);
            assert_eq!(members[1].identity, identity("bob"));
            assert_eq!(members[1].status, UserStatus::Online);
        }
    }

    #[tokio::test]
    async fn test_leave_is_visible_within_one_interval() {
        let state = test_state(25);
        let (alice_conn, _alice_rx) = connection_channel(8);
        let (bob_conn, mut bob_rx) = connection_channel(64);
        let alice = state
            .registry
            .register(identity("alice"), alice_conn, RoomId(1))
            .await;
        state
            .registry
            .register(identity("bob"), bob_conn, RoomId(1))
            .await;

        ensure_presence_task(&state, RoomId(1)).await;
        let (_, members) = recv_presence(&mut bob_rx).await;
        assert_eq!(members.len(), 2);

        state.registry.unregister(&alice).await;
        // Drain until bob observes the shrunken roster; bounded by the
        // one-interval staleness contract (generous timeout above).
        loop {
            let (_, members) = recv_presence(&mut bob_rx).await;
            if members.len() == 1 {
                assert_eq!(members[0].identity, identity("bob"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_broadcaster_retires_when_room_empties() {
        let state = test_state(10);
        let (conn, _rx) = connection_channel(8);
        let alice = state
            .registry
            .register(identity("alice"), conn, RoomId(7))
            .await;

        ensure_presence_task(&state, RoomId(7)).await;
        assert!(state.presence_rooms.lock().await.contains(&RoomId(7)));

        state.registry.unregister(&alice).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!state.presence_rooms.lock().await.contains(&RoomId(7)));
    }

    #[tokio::test]
    async fn test_unreachable_member_is_removed() {
        let state = test_state(10);
        // bob's receiver is dropped immediately: first push fails.
        let (bob_conn, bob_rx) = connection_channel(8);
        drop(bob_rx);
        state
            .registry
            .register(identity("bob"), bob_conn, RoomId(1))
            .await;
        let (alice_conn, mut alice_rx) = connection_channel(64);
        state
            .registry
            .register(identity("alice"), alice_conn, RoomId(1))
            .await;

        ensure_presence_task(&state, RoomId(1)).await;

        // Presence delivery self-heals: bob disappears from the registry
        // and from subsequent snapshots.
        loop {
            let (_, members) = recv_presence(&mut alice_rx).await;
            if members.len() == 1 {
                break;
            }
        }
        assert!(!state.registry.contains(&identity("bob")).await);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent_while_running() {
        let state = test_state(10);
        let (conn, _rx) = connection_channel(64);
        state
            .registry
            .register(identity("alice"), conn, RoomId(3))
            .await;

        ensure_presence_task(&state, RoomId(3)).await;
        ensure_presence_task(&state, RoomId(3)).await;
        assert_eq!(state.presence_rooms.lock().await.len(), 1);
    }
}
