//! Concrete collaborator implementations.
//!
//! The relay core only depends on the traits in `domain::collaborators`;
//! this layer provides implementations of them.

pub mod memory;

pub use memory::{InMemoryMessageStore, OpenAuthService};
