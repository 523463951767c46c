//! The queue orchestrator: admission for every role, consumers for subscribers.

use std::sync::Arc;

use chrono::Utc;
use queue_core::{
    ConsumerStatus, InstanceId, JobId, JobOptions, JobStatus, Notification, Role,
    validate_identifier,
};
use ractor::ActorRef;
use serde::Serialize;
use serde::de::DeserializeOwned;
use store::Store;
use tokio::task::JoinHandle;

use crate::dispatcher::{DispatcherArgs, start_dispatcher};
use crate::handler::{JobHandler, TypedHandler};
use crate::logging::init_logging;
use crate::messages::DispatcherMessage;
use crate::{OrchestratorConfig, OrchestratorError};

/// Entry point for producers and consumers of one process.
///
/// # Example
///
/// ```no_run
/// use actors::{Orchestrator, OrchestratorConfig};
/// use queue_core::{Job, JobOptions};
/// use store::StoreConfig;
///
/// # async fn demo() -> Result<(), actors::OrchestratorError> {
/// let config = OrchestratorConfig::subscriber(StoreConfig::redis("redis://127.0.0.1:6379"));
/// let mut orchestrator = Orchestrator::new(config)?;
/// orchestrator.init().await?;
///
/// orchestrator
///     .process("emails", |job: Job<serde_json::Value>| async move {
///         println!("sending {}", job.payload);
///         Ok(())
///     })
///     .await?;
///
/// orchestrator
///     .add("emails", "acme", &serde_json::json!({"to": "a@x"}), JobOptions::new())
///     .await;
/// orchestrator.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    config: OrchestratorConfig,
    instance: InstanceId,
    store: Option<Store>,
    owns_store: bool,
    dispatcher: Option<(ActorRef<DispatcherMessage>, JoinHandle<()>)>,
    initialized: bool,
    closed: bool,
}

impl Orchestrator {
    /// Validate the configuration and prepare an instance. Nothing connects until `init`.
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        config.validate()?;
        if let Some(level) = &config.log_level {
            init_logging(level)?;
        }

        Ok(Self {
            config,
            instance: InstanceId::new(),
            store: None,
            owns_store: true,
            dispatcher: None,
            initialized: false,
            closed: false,
        })
    }

    /// Build an instance over a store shared with other instances.
    ///
    /// `close` leaves a shared store open.
    pub fn with_store(config: OrchestratorConfig, store: Store) -> Result<Self, OrchestratorError> {
        let mut orchestrator = Self::new(config)?;
        orchestrator.store = Some(store);
        orchestrator.owns_store = false;
        Ok(orchestrator)
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    fn store(&self) -> Result<&Store, OrchestratorError> {
        if self.closed {
            return Err(OrchestratorError::Closed);
        }
        self.store.as_ref().ok_or(OrchestratorError::NotInitialized)
    }

    fn dispatcher(&self) -> Result<&ActorRef<DispatcherMessage>, OrchestratorError> {
        if self.closed {
            return Err(OrchestratorError::Closed);
        }
        if !self.config.role.is_subscriber() {
            return Err(OrchestratorError::WrongRole(self.config.role));
        }
        self.dispatcher
            .as_ref()
            .map(|(actor, _)| actor)
            .ok_or(OrchestratorError::NotInitialized)
    }

    /// Connect, register the scripts and, for subscribers, start dispatching.
    ///
    /// Calling it again after success is a no-op.
    pub async fn init(&mut self) -> Result<(), OrchestratorError> {
        if self.closed {
            return Err(OrchestratorError::Closed);
        }
        if self.initialized {
            return Ok(());
        }

        tracing::info!(
            "Initializing orchestrator {} as {}",
            self.instance,
            self.config.role
        );

        let store = match &self.store {
            Some(store) => store.clone(),
            None => Store::connect(self.config.store.clone()).await?,
        };
        store.init().await?;
        self.store = Some(store.clone());

        if self.config.role.is_subscriber() {
            let args = DispatcherArgs {
                instance: self.instance,
                store,
                limits: self.config.consumer_limits,
                poll_interval: self.config.poll_interval,
            };
            let dispatcher = start_dispatcher(args)
                .await
                .map_err(|e| OrchestratorError::Actor(format!("Failed to start dispatcher: {}", e)))?;
            self.dispatcher = Some(dispatcher);
        }

        self.initialized = true;
        Ok(())
    }

    /// Admit a job and announce it. Errors are returned to the caller.
    pub async fn try_add<P: Serialize + ?Sized>(
        &self,
        queue: &str,
        group: &str,
        payload: &P,
        options: JobOptions,
    ) -> Result<JobId, OrchestratorError> {
        let store = self.store()?;
        let encoded = serde_json::to_string(payload)?;
        let id = store
            .admit(queue, group, &encoded, &options, Utc::now())
            .await?;

        let note = Notification::new(queue, group);
        if let Err(e) = store.publish(&note).await {
            tracing::warn!("Failed to announce {}: {}", note.description(), e);
        }
        Ok(id)
    }

    /// Admit a job and announce it. Failures are logged and yield `None`.
    pub async fn add<P: Serialize + ?Sized>(
        &self,
        queue: &str,
        group: &str,
        payload: &P,
        options: JobOptions,
    ) -> Option<JobId> {
        match self.try_add(queue, group, payload, options).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!("Failed to add job to {}/{}: {}", queue, group, e);
                None
            }
        }
    }

    /// Register `handler` as the single consumer of `queue` and sweep it once.
    pub async fn process<P, H>(&self, queue: &str, handler: H) -> Result<(), OrchestratorError>
    where
        P: DeserializeOwned + Send + 'static,
        H: JobHandler<P>,
    {
        let dispatcher = self.dispatcher()?;
        validate_identifier("queue", queue)?;

        let (tx, rx) = ractor::concurrency::oneshot();
        dispatcher
            .send_message(DispatcherMessage::Register {
                queue: queue.to_string(),
                handler: Arc::new(TypedHandler::new(handler)),
                reply: tx.into(),
            })
            .map_err(OrchestratorError::actor)?;
        rx.await.map_err(OrchestratorError::actor)?
    }

    /// Current status of a job, or `None` once its record has expired.
    pub async fn status(&self, id: &JobId) -> Result<Option<JobStatus>, OrchestratorError> {
        Ok(self.store()?.status(id).await?)
    }

    /// Queues this instance consumes, with each consumer's status.
    pub async fn consumers(&self) -> Result<Vec<(String, ConsumerStatus)>, OrchestratorError> {
        let dispatcher = self.dispatcher()?;
        let (tx, rx) = ractor::concurrency::oneshot();
        dispatcher
            .send_message(DispatcherMessage::ListConsumers { reply: tx.into() })
            .map_err(OrchestratorError::actor)?;
        rx.await.map_err(OrchestratorError::actor)
    }

    /// Stop dispatching and release every connection. Later calls are no-ops.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::info!("Closing orchestrator {}", self.instance);

        if let Some((dispatcher, handle)) = self.dispatcher.take() {
            let (tx, rx) = ractor::concurrency::oneshot();
            if dispatcher
                .send_message(DispatcherMessage::Shutdown { reply: tx.into() })
                .is_ok()
            {
                let _ = rx.await;
            } else {
                dispatcher.stop(None);
            }
            if let Err(e) = handle.await {
                tracing::warn!("Dispatcher ended abnormally: {}", e);
            }
        }

        if let Some(store) = self.store.take()
            && self.owns_store
        {
            store.close().await;
        }
    }
}
