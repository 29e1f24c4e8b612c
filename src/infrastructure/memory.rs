//! In-memory collaborator implementations.
//!
//! These back the standalone binary and the integration tests. A real
//! deployment would put a database behind the same traits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AuthService, Identity, MessageStore, RoomId, StoreError, StoredMessage};

/// One persisted row, as the in-memory store keeps it.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: Uuid,
    pub identity: Identity,
    pub room: RoomId,
    pub text: String,
    pub source_addr: String,
    pub recorded_at: DateTime<Utc>,
}

/// Message store backed by plain maps. Every message gets a fresh UUID,
/// mirroring how the persistent schema keys chat rows.
#[derive(Default)]
pub struct InMemoryMessageStore {
    rows: Mutex<Vec<StoredRow>>,
    visits: Mutex<HashMap<RoomId, u64>>,
    contacts: Mutex<HashMap<Identity, HashSet<Identity>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All rows recorded for a room, in insertion order. Test/diagnostic
    /// accessor.
    pub async fn messages_in(&self, room: RoomId) -> Vec<StoredRow> {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|row| row.room == room)
            .cloned()
            .collect()
    }

    pub async fn visit_count(&self, room: RoomId) -> u64 {
        self.visits.lock().await.get(&room).copied().unwrap_or(0)
    }

    /// Record a mutual contact relationship.
    pub async fn add_contact(&self, a: Identity, b: Identity) {
        let mut contacts = self.contacts.lock().await;
        contacts.entry(a.clone()).or_default().insert(b.clone());
        contacts.entry(b).or_default().insert(a);
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn record_message(
        &self,
        identity: &Identity,
        room: RoomId,
        text: &str,
        source_addr: &str,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        rows.push(StoredRow {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            room,
            text: text.to_string(),
            source_addr: source_addr.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn load_recent_messages(
        &self,
        room: RoomId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = self.rows.lock().await;
        let mut recent: Vec<StoredMessage> = rows
            .iter()
            .filter(|row| row.room == room)
            .rev()
            .take(limit)
            .map(|row| StoredMessage {
                identity: row.identity.clone(),
                text: row.text.clone(),
            })
            .collect();
        recent.reverse(); // oldest first
        Ok(recent)
    }

    async fn record_room_join(&self, room: RoomId) -> Result<(), StoreError> {
        *self.visits.lock().await.entry(room).or_insert(0) += 1;
        Ok(())
    }

    async fn lookup_contacts(&self, identity: &Identity) -> Result<Vec<Identity>, StoreError> {
        let contacts = self.contacts.lock().await;
        let mut found: Vec<Identity> = contacts
            .get(identity)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        found.sort();
        Ok(found)
    }

    async fn is_contact(&self, a: &Identity, b: &Identity) -> Result<bool, StoreError> {
        let contacts = self.contacts.lock().await;
        Ok(contacts.get(a).is_some_and(|set| set.contains(b)))
    }
}

/// Auth service that accepts every identity. Stand-in for deployments where
/// login validation happens before the relay is reached.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAuthService;

#[async_trait]
impl AuthService for OpenAuthService {
    async fn verify_credentials(&self, identity: &Identity, _secret: &str) -> bool {
        tracing::debug!("accepting credentials for '{}'", identity);
        true
    }

    async fn identity_exists(&self, _identity: &Identity) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_load_recent_messages() {
        let store = InMemoryMessageStore::new();
        for i in 0..5 {
            store
                .record_message(&identity("alice"), RoomId(1), &format!("m{i}"), "10.0.0.1:1")
                .await
                .unwrap();
        }
        store
            .record_message(&identity("bob"), RoomId(2), "other room", "10.0.0.2:1")
            .await
            .unwrap();

        let recent = store.load_recent_messages(RoomId(1), 3).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        // Most recent three, oldest first.
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_visit_counter_increments() {
        let store = InMemoryMessageStore::new();
        store.record_room_join(RoomId(1)).await.unwrap();
        store.record_room_join(RoomId(1)).await.unwrap();
        assert_eq!(store.visit_count(RoomId(1)).await, 2);
        assert_eq!(store.visit_count(RoomId(2)).await, 0);
    }

    #[tokio::test]
    async fn test_contacts_are_mutual() {
        let store = InMemoryMessageStore::new();
        store.add_contact(identity("alice"), identity("bob")).await;

        assert!(store.is_contact(&identity("alice"), &identity("bob")).await.unwrap());
        assert!(store.is_contact(&identity("bob"), &identity("alice")).await.unwrap());
        assert!(!store.is_contact(&identity("alice"), &identity("carol")).await.unwrap());
        assert_eq!(
            store.lookup_contacts(&identity("alice")).await.unwrap(),
            vec![identity("bob")]
        );
    }
}
