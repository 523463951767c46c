//! The store facade shared by producers and consumers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use queue_core::{JobId, JobOptions, JobStatus, Notification, validate_identifier};
use serde::{Deserialize, Serialize};

#[cfg(feature = "memory")]
use crate::memory::MemoryEngine;
use crate::redis_engine::RedisEngine;
use crate::subscription::Subscription;
use crate::{Keys, StoreConfig, StoreError};

/// A job popped from its group, payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DequeuedJob {
    pub id: JobId,
    pub queue: String,
    pub group: String,
    pub payload: String,
}

enum Engine {
    Redis(RedisEngine),
    #[cfg(feature = "memory")]
    Memory(MemoryEngine),
}

struct StoreInner {
    engine: Engine,
    keys: Keys,
}

/// Handle to the job store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open the backend described by `config`.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let keys = Keys::new(config.namespace.clone());

        let engine = if config.is_memory() {
            #[cfg(feature = "memory")]
            {
                tracing::info!("Using in-memory store (namespace {})", keys.namespace());
                Engine::Memory(MemoryEngine::new(config.status_retention))
            }
            #[cfg(not(feature = "memory"))]
            {
                return Err(StoreError::InvalidConfig(
                    "memory store requested but the `memory` feature is disabled".into(),
                ));
            }
        } else {
            Engine::Redis(RedisEngine::connect(config).await?)
        };

        Ok(Self {
            inner: Arc::new(StoreInner { engine, keys }),
        })
    }

    /// Register the atomic scripts. Must run before any queue operation.
    pub async fn init(&self) -> Result<(), StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => engine.init().await,
            #[cfg(feature = "memory")]
            Engine::Memory(_) => Ok(()),
        }
    }

    pub fn keys(&self) -> &Keys {
        &self.inner.keys
    }

    /// Atomically admit a job into `queue`/`group` and return its id.
    pub async fn admit(
        &self,
        queue: &str,
        group: &str,
        payload: &str,
        options: &JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobId, StoreError> {
        validate_identifier("queue", queue)?;
        validate_identifier("group", group)?;

        let id = match &self.inner.engine {
            Engine::Redis(engine) => {
                engine
                    .admit(self.keys(), queue, group, payload, options, now)
                    .await?
            }
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.admit(queue, group, payload, options, now).await?,
        };
        tracing::debug!(
            "Admitted job {} into {}/{} (priority {})",
            id,
            queue,
            group,
            options.priority
        );
        Ok(id)
    }

    /// Groups of `queue` that currently hold jobs, in name order.
    pub async fn groups(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => engine.groups(self.keys(), queue).await,
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.groups(queue).await,
        }
    }

    /// Atomically pop the next eligible job from one group.
    pub async fn dequeue(
        &self,
        queue: &str,
        group: &str,
        worker: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DequeuedJob>, StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => {
                engine
                    .dequeue(self.keys(), queue, group, worker, now)
                    .await
            }
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.dequeue(queue, group, worker, now).await,
        }
    }

    /// Current status of a job, or `None` once its record is gone.
    pub async fn status(&self, id: &JobId) -> Result<Option<JobStatus>, StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => engine.status(self.keys(), id).await,
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.status(id).await,
        }
    }

    /// Record a job's new status. Returns `false` when the job is unknown.
    pub async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => {
                engine
                    .update_status(self.keys(), id, status, error, now)
                    .await
            }
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.update_status(id, status, error, now).await,
        }
    }

    /// Announce a new job on the notification channel.
    pub async fn publish(&self, note: &Notification) -> Result<(), StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => engine.publish(self.keys(), note).await,
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.publish(note).await,
        }
    }

    /// Subscribe to the notification channel.
    pub async fn subscribe(&self) -> Result<Subscription, StoreError> {
        match &self.inner.engine {
            Engine::Redis(engine) => engine.subscribe(self.keys()).await,
            #[cfg(feature = "memory")]
            Engine::Memory(engine) => engine.subscribe().await,
        }
    }

    /// Shut the connection pool. Idempotent.
    pub async fn close(&self) {
        match &self.inner.engine {
            Engine::Redis(engine) => engine.close().await,
            #[cfg(feature = "memory")]
            Engine::Memory(_) => {}
        }
        tracing::info!("Store closed ({})", self.keys().namespace());
    }
}
