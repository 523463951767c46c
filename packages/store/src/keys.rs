//! Store key and channel naming.

use queue_core::JobId;

/// Builds every key under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    namespace: String,
}

impl Keys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Set of group names with pending jobs in `queue`.
    pub fn groups_index(&self, queue: &str) -> String {
        format!("{}:queue:{}:groups", self.namespace, queue)
    }

    /// Sorted set of job ids in one group.
    pub fn group(&self, queue: &str, group: &str) -> String {
        format!("{}:queue:{}:group:{}", self.namespace, queue, group)
    }

    /// Counter used to mint job ids.
    pub fn job_sequence(&self) -> String {
        format!("{}:job:seq", self.namespace)
    }

    /// Prefix that a job id is appended to inside scripts.
    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.namespace)
    }

    /// Hash holding one job's record.
    pub fn job(&self, id: &JobId) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    /// Pub/sub channel for new-job notifications.
    pub fn notifications(&self) -> String {
        format!("{}:notifications", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        let keys = Keys::new("groupq");
        assert_eq!(keys.groups_index("emails"), "groupq:queue:emails:groups");
        assert_eq!(keys.group("emails", "acme"), "groupq:queue:emails:group:acme");
        assert_eq!(keys.job_sequence(), "groupq:job:seq");
        assert_eq!(
            keys.job(&JobId::from_sequence(7)),
            "groupq:job:0000000000000007"
        );
        assert_eq!(keys.notifications(), "groupq:notifications");
    }

    #[test]
    fn test_job_key_is_prefix_plus_id() {
        // The enqueue and dequeue scripts rebuild record keys this way.
        let keys = Keys::new("ns");
        let id = JobId::from_sequence(42);
        assert_eq!(keys.job(&id), format!("{}{}", keys.job_prefix(), id));
    }
}
