//! Queue-level domain types: identifiers, consumer status and roles.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::ValidationError;

/// Unique identifier for an orchestrator instance, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub Ulid);

impl InstanceId {
    /// Create a new unique instance ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse an instance ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check that a queue or group name can be embedded in a store key.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyIdentifier { kind });
    }
    if value.contains(':') || value.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// State of a queue's consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    /// Idle and ready for the next sweep.
    #[default]
    Sleeping,
    /// Claimed by a sweep; a job may be in flight.
    Running,
}

impl std::fmt::Display for ConsumerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerStatus::Sleeping => write!(f, "sleeping"),
            ConsumerStatus::Running => write!(f, "running"),
        }
    }
}

/// What an orchestrator instance is allowed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Admits jobs and publishes notifications.
    #[default]
    Publisher,
    /// Admits jobs and also registers consumers that drain queues.
    Subscriber,
}

impl Role {
    pub fn is_subscriber(self) -> bool {
        matches!(self, Role::Subscriber)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publisher" | "pub" => Ok(Role::Publisher),
            "subscriber" | "sub" => Ok(Role::Subscriber),
            other => Err(format!(
                "unsupported role '{other}' (expected publisher|subscriber)"
            )),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}
