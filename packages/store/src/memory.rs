//! In-process engine with the same contracts as the Redis scripts.
//!
//! Every operation runs under one mutex, which gives it the same atomicity a
//! script has on the server. Useful for tests and single-process deployments.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use queue_core::{JobId, JobOptions, JobStatus, Notification};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};

use crate::subscription::Subscription;
use crate::{DequeuedJob, StoreError};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct JobRecord {
    payload: String,
    group: String,
    not_before: i64,
    expires_at: Option<i64>,
    status: JobStatus,
    started_at: Option<i64>,
    worker: Option<String>,
    finished_at: Option<i64>,
    error: Option<String>,
    purge_at: Option<i64>,
}

#[derive(Debug, Default)]
struct QueueState {
    index: BTreeSet<String>,
    groups: HashMap<String, BTreeSet<(i64, JobId)>>,
}

#[derive(Debug, Default)]
struct State {
    seq: u64,
    queues: HashMap<String, QueueState>,
    jobs: HashMap<JobId, JobRecord>,
}

impl State {
    /// Drop terminal records whose retention has passed.
    fn purge(&mut self, now_ms: i64) {
        self.jobs
            .retain(|_, record| record.purge_at.is_none_or(|at| at > now_ms));
    }
}

/// Store engine held entirely in memory.
pub struct MemoryEngine {
    state: Mutex<State>,
    notifications: broadcast::Sender<Notification>,
    retention: Duration,
}

impl MemoryEngine {
    pub fn new(retention: Duration) -> Self {
        let (notifications, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            notifications,
            retention,
        }
    }

    fn retention_ms(&self) -> i64 {
        i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX)
    }

    pub async fn admit(
        &self,
        queue: &str,
        group: &str,
        payload: &str,
        options: &JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobId, StoreError> {
        let now_ms = now.timestamp_millis();
        let not_before = now_ms.saturating_add(options.delay_ms());
        let expires_at = options.ttl.map(|_| now_ms.saturating_add(options.ttl_ms()));

        let mut state = self.state.lock().await;
        state.seq += 1;
        let id = JobId::from_sequence(state.seq);

        state.jobs.insert(
            id.clone(),
            JobRecord {
                payload: payload.to_string(),
                group: group.to_string(),
                not_before,
                expires_at,
                status: JobStatus::Queued,
                started_at: None,
                worker: None,
                finished_at: None,
                error: None,
                purge_at: None,
            },
        );

        let queue_state = state.queues.entry(queue.to_string()).or_default();
        queue_state
            .groups
            .entry(group.to_string())
            .or_default()
            .insert((options.priority.score(not_before), id.clone()));
        queue_state.index.insert(group.to_string());

        Ok(id)
    }

    pub async fn groups(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(queue)
            .map(|q| q.index.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub async fn dequeue(
        &self,
        queue: &str,
        group: &str,
        worker: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DequeuedJob>, StoreError> {
        let now_ms = now.timestamp_millis();
        let purge_at = now_ms.saturating_add(self.retention_ms());

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(queue_state) = state.queues.get_mut(queue) else {
            return Ok(None);
        };

        loop {
            let head = queue_state
                .groups
                .get(group)
                .and_then(|entries| entries.first().cloned());
            let Some(entry) = head else {
                queue_state.groups.remove(group);
                queue_state.index.remove(group);
                return Ok(None);
            };
            let id = entry.1.clone();

            let Some(record) = state.jobs.get_mut(&id) else {
                remove_entry(queue_state, group, &entry);
                continue;
            };

            if record.expires_at.is_some_and(|at| at <= now_ms) {
                remove_entry(queue_state, group, &entry);
                record.status = JobStatus::Failed;
                record.error = Some("expired".to_string());
                record.finished_at = Some(now_ms);
                record.purge_at = Some(purge_at);
                tracing::debug!("Job {} expired before pickup", id);
                continue;
            }

            if record.not_before > now_ms {
                return Ok(None);
            }

            remove_entry(queue_state, group, &entry);
            record.status = JobStatus::Processing;
            record.started_at = Some(now_ms);
            record.worker = Some(worker.to_string());

            let drained = queue_state
                .groups
                .get(group)
                .is_none_or(|entries| entries.is_empty());
            if drained {
                queue_state.groups.remove(group);
                queue_state.index.remove(group);
            }

            return Ok(Some(DequeuedJob {
                id,
                queue: queue.to_string(),
                group: record.group.clone(),
                payload: record.payload.clone(),
            }));
        }
    }

    pub async fn status(&self, id: &JobId) -> Result<Option<JobStatus>, StoreError> {
        let mut state = self.state.lock().await;
        state.purge(Utc::now().timestamp_millis());
        Ok(state.jobs.get(id).map(|record| record.status))
    }

    pub async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let now_ms = now.timestamp_millis();
        let purge_at = now_ms.saturating_add(self.retention_ms());

        let mut state = self.state.lock().await;
        state.purge(now_ms);
        let Some(record) = state.jobs.get_mut(id) else {
            return Ok(false);
        };

        record.status = status;
        if status.is_terminal() {
            record.finished_at = Some(now_ms);
            if let Some(error) = error.filter(|e| !e.is_empty()) {
                record.error = Some(error.to_string());
            }
            record.purge_at = Some(purge_at);
        }
        Ok(true)
    }

    pub async fn publish(&self, note: &Notification) -> Result<(), StoreError> {
        // No receivers is not an error: nobody is listening yet.
        let _ = self.notifications.send(note.clone());
        Ok(())
    }

    pub async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let mut source = self.notifications.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    received = source.recv() => match received {
                        Ok(note) => {
                            if tx.send(note).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("Subscription lagged, {} notifications missed", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(Subscription::new(rx, stop_tx, task))
    }
}

fn remove_entry(queue_state: &mut QueueState, group: &str, entry: &(i64, JobId)) {
    if let Some(entries) = queue_state.groups.get_mut(group) {
        entries.remove(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_follow_admission_order() {
        let engine = MemoryEngine::new(Duration::from_secs(60));
        let now = Utc::now();
        let first = engine
            .admit("q", "g", "1", &JobOptions::new(), now)
            .await
            .unwrap();
        let second = engine
            .admit("q", "g", "2", &JobOptions::new(), now)
            .await
            .unwrap();
        assert!(first < second);
        assert_eq!(first.as_str(), "0000000000000001");
    }

    #[tokio::test]
    async fn test_dangling_entry_is_skipped() {
        let engine = MemoryEngine::new(Duration::from_secs(60));
        let now = Utc::now();
        let gone = engine
            .admit("q", "g", "gone", &JobOptions::new(), now)
            .await
            .unwrap();
        engine
            .admit("q", "g", "kept", &JobOptions::new(), now)
            .await
            .unwrap();
        engine.state.lock().await.jobs.remove(&gone);

        let job = engine.dequeue("q", "g", "w", now).await.unwrap().unwrap();
        assert_eq!(job.payload, "kept");
        assert!(engine.groups("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_job_records_reason() {
        let engine = MemoryEngine::new(Duration::from_secs(60));
        let now = Utc::now();
        let options = JobOptions::new()
            .with_ttl(Duration::from_millis(10))
            .unwrap();
        let id = engine.admit("q", "g", "late", &options, now).await.unwrap();

        let later = now + chrono::Duration::milliseconds(20);
        assert!(engine.dequeue("q", "g", "w", later).await.unwrap().is_none());

        let state = engine.state.lock().await;
        let record = &state.jobs[&id];
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("expired"));
        assert_eq!(record.finished_at, Some(later.timestamp_millis()));
    }

    #[tokio::test]
    async fn test_unbounded_delay_is_held_back() {
        let engine = MemoryEngine::new(Duration::from_secs(60));
        let now = Utc::now();
        let options = JobOptions {
            delay: Duration::MAX,
            ..JobOptions::new()
        };
        engine.admit("q", "g", "never", &options, now).await.unwrap();

        assert!(engine.dequeue("q", "g", "w", now).await.unwrap().is_none());
        let state = engine.state.lock().await;
        let record = state.jobs.values().next().unwrap();
        assert!(record.not_before > now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_dequeue_records_worker() {
        let engine = MemoryEngine::new(Duration::from_secs(60));
        let now = Utc::now();
        let id = engine
            .admit("q", "g", "x", &JobOptions::new(), now)
            .await
            .unwrap();
        engine.dequeue("q", "g", "worker-1", now).await.unwrap();

        let state = engine.state.lock().await;
        assert_eq!(state.jobs[&id].worker.as_deref(), Some("worker-1"));
        assert_eq!(state.jobs[&id].started_at, Some(now.timestamp_millis()));
    }

    #[tokio::test]
    async fn test_update_of_unknown_job_is_not_acknowledged() {
        let engine = MemoryEngine::new(Duration::from_secs(60));
        let acked = engine
            .update_status(&JobId::from_sequence(9), JobStatus::Completed, None, Utc::now())
            .await
            .unwrap();
        assert!(!acked);
    }
}
