//! Redis engine: pooled multiplexed connections, Lua scripts and pub/sub.
//!
//! Targets standalone Redis: the scripts derive job record keys from a prefix
//! rather than declaring them, which Cluster does not allow.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use queue_core::{JobId, JobOptions, JobStatus, Notification, PRIORITY_STRIDE};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind, FromRedisValue, IntoConnectionInfo};
use tokio::sync::{OnceCell, mpsc, oneshot};

use crate::pool::{ManageConnection, Pool};
use crate::scripts::{ScriptName, ScriptRegistry, script_load};
use crate::subscription::Subscription;
use crate::{DequeuedJob, Keys, StoreConfig, StoreError};

/// Opens multiplexed connections for the pool.
pub struct RedisManager {
    client: redis::Client,
}

impl ManageConnection for RedisManager {
    type Connection = MultiplexedConnection;

    async fn connect(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn close(&self, mut conn: MultiplexedConnection) {
        let quit: Result<(), redis::RedisError> = redis::cmd("QUIT").query_async(&mut conn).await;
        if let Err(e) = quit {
            tracing::debug!("QUIT on pooled connection failed: {}", e);
        }
    }
}

/// Store engine backed by a Redis server.
pub struct RedisEngine {
    client: redis::Client,
    pool: Pool<RedisManager>,
    scripts: OnceCell<ScriptRegistry>,
    config: StoreConfig,
}

impl RedisEngine {
    /// Connect to the server described by `config` and warm the pool.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let mut info = config.endpoint.as_str().into_connection_info()?;
        if let Some((username, password)) = &config.credentials {
            info.redis.username = username.clone();
            info.redis.password = Some(password.clone());
        }
        let client = redis::Client::open(info)?;

        tracing::info!("Connecting to Redis: {}", config.endpoint);
        let pool = Pool::new(
            RedisManager {
                client: client.clone(),
            },
            config.pool.clone(),
        )
        .await?;

        Ok(Self {
            client,
            pool,
            scripts: OnceCell::new(),
            config,
        })
    }

    /// Load and register every script. Runs once; later calls are no-ops.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.scripts
            .get_or_try_init(|| async {
                let mut conn = self.pool.acquire().await?;
                let registry = ScriptRegistry::register(&mut *conn, &self.config.scripts).await?;
                tracing::info!("Registered {} scripts", ScriptName::ALL.len());
                Ok::<_, StoreError>(registry)
            })
            .await?;
        Ok(())
    }

    /// Run a registered script by digest, re-registering it once if the server evicted it.
    async fn invoke<T: FromRedisValue + Send>(
        &self,
        name: ScriptName,
        keys: &[String],
        args: &[String],
    ) -> Result<T, StoreError> {
        let handle = self
            .scripts
            .get()
            .and_then(|scripts| scripts.handle(name))
            .ok_or(StoreError::ScriptMissing(name))?;

        let mut conn = self.pool.acquire().await?;
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(&handle.sha).arg(keys.len()).arg(keys).arg(args);

        let result: Result<T, redis::RedisError> = match cmd.query_async(&mut *conn).await {
            Err(e) if e.kind() == ErrorKind::NoScriptError => {
                tracing::warn!("Script {} was evicted, registering it again", name);
                script_load(&mut *conn, &handle.source).await?;
                cmd.query_async(&mut *conn).await
            }
            other => other,
        };

        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = StoreError::from(e);
                if err.is_connection_error() {
                    conn.discard().await;
                }
                Err(err)
            }
        }
    }

    pub async fn admit(
        &self,
        keys: &Keys,
        queue: &str,
        group: &str,
        payload: &str,
        options: &JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobId, StoreError> {
        let id: String = self
            .invoke(
                ScriptName::Enqueue,
                &[
                    keys.groups_index(queue),
                    keys.group(queue, group),
                    keys.job_sequence(),
                ],
                &[
                    payload.to_string(),
                    group.to_string(),
                    options.priority.value().to_string(),
                    options.delay_ms().to_string(),
                    options.ttl_ms().to_string(),
                    now.timestamp_millis().to_string(),
                    keys.job_prefix(),
                    queue.to_string(),
                    PRIORITY_STRIDE.to_string(),
                ],
            )
            .await?;
        Ok(JobId::from(id))
    }

    pub async fn groups(&self, keys: &Keys, queue: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let mut groups: Vec<String> = conn.smembers(keys.groups_index(queue)).await?;
        groups.sort();
        Ok(groups)
    }

    pub async fn dequeue(
        &self,
        keys: &Keys,
        queue: &str,
        group: &str,
        worker: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DequeuedJob>, StoreError> {
        let popped: Option<(String, String, String)> = self
            .invoke(
                ScriptName::Dequeue,
                &[keys.group(queue, group), keys.groups_index(queue)],
                &[
                    now.timestamp_millis().to_string(),
                    keys.job_prefix(),
                    group.to_string(),
                    worker.to_string(),
                    self.retention_ms(),
                ],
            )
            .await?;

        Ok(popped.map(|(id, payload, group)| DequeuedJob {
            id: JobId::from(id),
            queue: queue.to_string(),
            group,
            payload,
        }))
    }

    pub async fn status(&self, keys: &Keys, id: &JobId) -> Result<Option<JobStatus>, StoreError> {
        let raw: Option<String> = self
            .invoke(ScriptName::GetStatus, &[keys.job(id)], &[])
            .await?;
        Ok(raw.map(|s| s.parse::<JobStatus>()).transpose()?)
    }

    pub async fn update_status(
        &self,
        keys: &Keys,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let ack: i64 = self
            .invoke(
                ScriptName::UpdateStatus,
                &[keys.job(id)],
                &[
                    status.as_str().to_string(),
                    now.timestamp_millis().to_string(),
                    error.unwrap_or_default().to_string(),
                    self.retention_ms(),
                ],
            )
            .await?;
        Ok(ack == 1)
    }

    pub async fn publish(&self, keys: &Keys, note: &Notification) -> Result<(), StoreError> {
        let message = note.to_json()?;
        let mut conn = self.pool.acquire().await?;
        let _receivers: i64 = conn.publish(keys.notifications(), message).await?;
        Ok(())
    }

    /// Open a dedicated pub/sub connection on the notification channel.
    pub async fn subscribe(&self, keys: &Keys) -> Result<Subscription, StoreError> {
        let channel = keys.notifications();
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(&channel).await?;
        tracing::info!("Subscribed to {}", channel);

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            {
                let mut messages = Box::pin(pubsub.on_message());
                loop {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        msg = messages.next() => {
                            let Some(msg) = msg else {
                                tracing::warn!("Subscription to {} dropped", channel);
                                return;
                            };
                            let raw: String = match msg.get_payload() {
                                Ok(raw) => raw,
                                Err(e) => {
                                    tracing::warn!("Unreadable notification: {}", e);
                                    continue;
                                }
                            };
                            match Notification::from_json(&raw) {
                                Ok(note) => {
                                    if tx.send(note).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => tracing::warn!("Ignoring malformed notification: {}", e),
                            }
                        }
                    }
                }
            }
            if let Err(e) = pubsub.unsubscribe(&channel).await {
                tracing::debug!("Unsubscribe from {} failed: {}", channel, e);
            }
        });

        Ok(Subscription::new(rx, stop_tx, task))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn retention_ms(&self) -> String {
        self.config.status_retention.as_millis().to_string()
    }
}
