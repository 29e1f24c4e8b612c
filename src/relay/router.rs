//! Room routing: recipient selection and snapshot-based fan-out.
//!
//! Recipient selection is a pure function over a registry snapshot, so a
//! fixed snapshot always yields the same recipient set. Fan-out works on
//! the snapshot too; no registry lock is held while writing to sockets, so
//! one slow peer can never stall delivery to the others.

use crate::domain::{Identity, UserStatus};
use crate::protocol::ServerEvent;

use super::registry::{SessionHandle, SessionSnapshot};

/// Everyone in the snapshot except the sender, minus offline sessions.
pub fn recipients_for<'a>(
    snapshot: &'a [SessionSnapshot],
    sender: &Identity,
) -> Vec<&'a SessionSnapshot> {
    snapshot
        .iter()
        .filter(|session| session.identity() != sender)
        .filter(|session| session.status != UserStatus::Offline)
        .collect()
}

/// Send one event to every recipient.
///
/// Delivery is best-effort: a recipient whose `send` fails is closed and
/// its handle returned so the caller can remove the dead session. Failures
/// never abort the rest of the fan-out.
pub fn fan_out(recipients: &[&SessionSnapshot], event: &ServerEvent) -> Vec<SessionHandle> {
    let mut unreachable = Vec::new();
    for recipient in recipients {
        if recipient.conn.send(event.clone()).is_err() {
            tracing::warn!(
                "peer '{}' unreachable during fan-out, dropping its session",
                recipient.identity()
            );
            recipient.conn.close();
            unreachable.push(recipient.handle.clone());
        }
    }
    unreachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Identity, RoomId};
    use crate::relay::connection::connection_channel;
    use crate::relay::registry::SessionRegistry;

    fn identity(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    async fn populate(
        registry: &SessionRegistry,
        name: &str,
        room: RoomId,
    ) -> tokio::sync::mpsc::Receiver<ServerEvent> {
        let (conn, rx) = connection_channel(8);
        registry.register(identity(name), conn, room).await;
        rx
    }

    #[tokio::test]
    async fn test_recipients_are_same_room_minus_sender() {
        let registry = SessionRegistry::new();
        let _alice = populate(&registry, "alice", RoomId(1)).await;
        let _bob = populate(&registry, "bob", RoomId(1)).await;
        let _carol = populate(&registry, "carol", RoomId(2)).await;

        let snapshot = registry.snapshot_room(RoomId(1)).await;
        let recipients = recipients_for(&snapshot, &identity("alice"));

        let names: Vec<&str> = recipients.iter().map(|s| s.identity().as_str()).collect();
        assert_eq!(names, vec!["bob"]);
    }

    #[tokio::test]
    async fn test_recipients_exclude_offline_sessions() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = connection_channel(8);
        let bob = registry.register(identity("bob"), conn, RoomId(1)).await;
        let _alice = populate(&registry, "alice", RoomId(1)).await;
        let _carol = populate(&registry, "carol", RoomId(1)).await;

        registry
            .set_status(&bob, crate::domain::UserStatus::Offline)
            .await;

        let snapshot = registry.snapshot_room(RoomId(1)).await;
        let recipients = recipients_for(&snapshot, &identity("alice"));
        let names: Vec<&str> = recipients.iter().map(|s| s.identity().as_str()).collect();
        assert_eq!(names, vec!["carol"]);
    }

    #[tokio::test]
    async fn test_recipient_selection_is_deterministic() {
        let registry = SessionRegistry::new();
        let mut receivers = Vec::new();
        for name in ["dave", "bob", "erin", "carol"] {
            receivers.push(populate(&registry, name, RoomId(1)).await);
        }

        let snapshot = registry.snapshot_room(RoomId(1)).await;
        let first: Vec<String> = recipients_for(&snapshot, &identity("bob"))
            .iter()
            .map(|s| s.identity().to_string())
            .collect();
        let second: Vec<String> = recipients_for(&snapshot, &identity("bob"))
            .iter()
            .map(|s| s.identity().to_string())
            .collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["carol", "dave", "erin"]);
    }

    #[tokio::test]
    async fn test_fan_out_reports_unreachable_peers() {
        let registry = SessionRegistry::new();
        let _alice = populate(&registry, "alice", RoomId(1)).await;

        // bob's receiver is dropped, so any send to him fails.
        let (bob_conn, bob_rx) = connection_channel(8);
        drop(bob_rx);
        let bob = registry
            .register(identity("bob"), bob_conn, RoomId(1))
            .await;

        let snapshot = registry.snapshot_room(RoomId(1)).await;
        let recipients = recipients_for(&snapshot, &identity("carol"));
        let event = ServerEvent::Typing {
            identity: identity("carol"),
        };

        let unreachable = fan_out(&recipients, &event);
        assert_eq!(unreachable, vec![bob]);
    }
}
