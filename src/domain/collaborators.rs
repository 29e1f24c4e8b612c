//! Collaborator traits consumed by the relay core.
//!
//! The relay treats authentication and persistence as external services
//! behind these interfaces. Concrete implementations live in the
//! infrastructure layer; tests substitute mocks.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::error::StoreError;
use super::value_object::{Identity, RoomId};

/// One persisted chat line, as returned by history queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub identity: Identity,
    pub text: String,
}

/// Identity verification service.
///
/// The relay trusts a pre-validated identity at login time; it performs no
/// hashing or credential storage itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn verify_credentials(&self, identity: &Identity, secret: &str) -> bool;

    async fn identity_exists(&self, identity: &Identity) -> bool;
}

/// Persistence service for chat history, room visits and contacts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Record one chat message together with its source address.
    async fn record_message(
        &self,
        identity: &Identity,
        room: RoomId,
        text: &str,
        source_addr: &str,
    ) -> Result<(), StoreError>;

    /// Load the most recent messages for a room, oldest first. Used once at
    /// room-join time to prime a joining client's history.
    async fn load_recent_messages(
        &self,
        room: RoomId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Bump the visit counter for a room.
    async fn record_room_join(&self, room: RoomId) -> Result<(), StoreError>;

    /// All contacts of the given identity.
    async fn lookup_contacts(&self, identity: &Identity) -> Result<Vec<Identity>, StoreError>;

    /// Whether two identities are contacts of each other.
    async fn is_contact(&self, a: &Identity, b: &Identity) -> Result<bool, StoreError>;
}
