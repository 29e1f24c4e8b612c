//! Session-scoped chat relay library.
//!
//! Accepts many concurrent WebSocket connections, tracks each connected
//! user's identity, online status and current room, and fans out chat,
//! presence and typing events to exactly the right subset of connections.
//! Persistence and authentication are external collaborators behind the
//! traits in [`domain::collaborators`].

// layers
pub mod domain;
pub mod infrastructure;
pub mod protocol;
pub mod relay;

// shared library
pub mod common;
