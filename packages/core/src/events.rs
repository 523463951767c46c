//! Notification published when a job is admitted.

use serde::{Deserialize, Serialize};

/// Message carried on the shared new-job channel.
///
/// Delivery is best effort; consumers that miss one still find the job on
/// the next poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub queue: String,
    pub group: String,
}

impl Notification {
    pub fn new(queue: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            group: group.into(),
        }
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a message received from the channel.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Get a short description of this notification for logging.
    pub fn description(&self) -> String {
        format!("new job in {}/{}", self.queue, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let note = Notification::new("Q", "G");
        let raw = note.to_json().expect("notification should encode");
        assert_eq!(raw, r#"{"queue":"Q","group":"G"}"#);
        assert_eq!(Notification::from_json(&raw).ok(), Some(note));
    }

    #[test]
    fn test_malformed_message_is_rejected() {
        assert!(Notification::from_json("not json").is_err());
        assert!(Notification::from_json(r#"{"queue":"Q"}"#).is_err());
    }
}
