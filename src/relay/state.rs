//! Shared relay state and configuration.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{AuthService, MessageStore, RoomId};
use crate::protocol::ServerEvent;

use super::registry::{SessionHandle, SessionRegistry};
use super::router::{fan_out, recipients_for};

/// Tunables for one relay instance.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Cadence of the per-room presence broadcast. Roster changes may be
    /// observed up to one interval late; that staleness bound is by
    /// contract.
    pub presence_interval: Duration,
    /// Capacity of each connection's outbound buffer. A peer that lets
    /// this fill up is treated as unreachable.
    pub outbound_buffer: usize,
    /// How many recent messages to replay when a session joins a room.
    pub history_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_secs(5),
            outbound_buffer: 64,
            history_limit: 50,
        }
    }
}

/// State shared by the accept loop, all handler tasks and all presence
/// broadcaster tasks. The registry inside is the single serialization
/// point for presence state.
pub struct RelayState {
    pub config: RelayConfig,
    pub registry: SessionRegistry,
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn MessageStore>,
    /// Rooms that currently have a running presence broadcaster task.
    pub(crate) presence_rooms: Mutex<HashSet<RoomId>>,
    /// Cooperative shutdown signal for every task owned by this instance.
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(
        config: RelayConfig,
        auth: Arc<dyn AuthService>,
        store: Arc<dyn MessageStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            auth,
            store,
            presence_rooms: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    /// Remove a session and, if this call was the one that removed it,
    /// relay the departure notice to the room it was last in.
    ///
    /// Safe to call from the handler teardown, the fan-out self-heal path
    /// and the presence broadcaster at the same time: `unregister` is
    /// idempotent, so exactly one caller wins and sends the notice.
    pub async fn remove_session(&self, handle: &SessionHandle) {
        let Some(departed) = self.registry.unregister(handle).await else {
            return;
        };
        tracing::info!(
            "session '{}' removed from room {}",
            departed.identity,
            departed.room
        );

        let snapshot = self.registry.snapshot_room(departed.room).await;
        let recipients = recipients_for(&snapshot, &departed.identity);
        let notice = ServerEvent::Notice {
            text: format!("{} has left the session", departed.identity),
        };
        // Peers that fail here are dropped without a nested notice; their
        // own handlers observe the closed connection and exit.
        for dead in fan_out(&recipients, &notice) {
            self.registry.unregister(&dead).await;
        }
    }
}
