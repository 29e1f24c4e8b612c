//! Value objects shared across the relay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::RelayError;

/// Unique user handle (alias). Non-empty after trimming.
///
/// Deserialization goes through [`Identity::new`], so an empty handle can
/// never enter the system from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create a new Identity.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::MalformedEvent` if the handle is empty or
    /// whitespace-only.
    pub fn new(value: impl Into<String>) -> Result<Self, RelayError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(RelayError::MalformedEvent(
                "identity must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room identifier. Rooms are a grouping key over sessions, not an entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Online status of a session. Only these four values are accepted; anything
/// else is rejected with `RelayError::InvalidStatus` and prior state kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Online,
    Offline,
    Busy,
    Away,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "ONLINE",
            UserStatus::Offline => "OFFLINE",
            UserStatus::Busy => "BUSY",
            UserStatus::Away => "AWAY",
        }
    }
}

impl FromStr for UserStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(UserStatus::Online),
            "OFFLINE" => Ok(UserStatus::Offline),
            "BUSY" => Ok(UserStatus::Busy),
            "AWAY" => Ok(UserStatus::Away),
            _ => Err(RelayError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
