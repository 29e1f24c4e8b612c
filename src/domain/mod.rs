//! Domain model for the chat relay.
//!
//! Value objects, the relay error taxonomy and the collaborator traits the
//! core calls through. Nothing in this layer touches sockets or tasks.

pub mod collaborators;
pub mod error;
pub mod value_object;

pub use collaborators::{AuthService, MessageStore, StoredMessage};
pub use error::{RelayError, StoreError};
pub use value_object::{Identity, RoomId, UserStatus};
