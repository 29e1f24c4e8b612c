//! The relay core.
//!
//! Connection plumbing, the session registry, room routing, presence
//! broadcasting and the per-connection handler state machine, plus the
//! top-level accept loop.

pub mod connection;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod router;
pub mod runner;
pub mod signal;
pub mod state;

pub use runner::{RelayHandle, RelayServer};
pub use state::{RelayConfig, RelayState};
