//! One fair pass over a queue's groups.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::{DequeuedJob, Store, StoreError};

/// Walks a snapshot of a queue's groups, popping at most one job per group.
///
/// Groups are visited in name order. Groups admitted after the snapshot wait
/// for the next pass.
pub struct Sweep {
    queue: String,
    worker: String,
    pending: VecDeque<String>,
}

impl Sweep {
    /// Snapshot the groups currently holding jobs in `queue`.
    pub async fn start(store: &Store, queue: &str, worker: &str) -> Result<Self, StoreError> {
        let groups = store.groups(queue).await?;
        tracing::debug!("Sweeping {} groups in {}", groups.len(), queue);
        Ok(Self {
            queue: queue.to_string(),
            worker: worker.to_string(),
            pending: groups.into(),
        })
    }

    /// Pop from the next group that yields a job.
    ///
    /// Groups whose head is not yet eligible (or that emptied out) are skipped.
    /// Returns `None` once every group has been visited.
    pub async fn next_job(
        &mut self,
        store: &Store,
        now: DateTime<Utc>,
    ) -> Result<Option<DequeuedJob>, StoreError> {
        while let Some(group) = self.pending.pop_front() {
            if let Some(job) = store.dequeue(&self.queue, &group, &self.worker, now).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }
}
