//! Error taxonomy for the relay core.

use thiserror::Error;

/// Errors surfaced by the relay core.
///
/// Connection-local errors (`ConnectionClosed`, `PeerUnreachable`) are
/// contained to the handler that observed them and treated as
/// logout-equivalent. `MalformedEvent` and `InvalidStatus` reject the
/// offending input and leave prior state unchanged.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Peer ended the link, normally or abruptly.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A write to the peer failed or its outbound buffer is full.
    #[error("peer unreachable")]
    PeerUnreachable,

    /// Status value outside the four accepted ones.
    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    /// Undecodable or unexpected inbound data. Dropped, never fatal.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Storage collaborator error. Logged, never blocks relay.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Error returned by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}
