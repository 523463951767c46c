//! Dispatcher actor: turns notifications and poll ticks into consumer sweeps.

use std::time::Duration;

use queue_core::{InstanceId, Notification};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use store::Store;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::consumer::{ConsumerActor, ConsumerArgs, ConsumerSlot};
use crate::messages::DispatcherMessage;
use crate::registry::{ConsumerRegistry, RegisteredConsumer};
use crate::{ConsumerLimits, OrchestratorError};

/// Dispatcher actor arguments.
pub struct DispatcherArgs {
    pub instance: InstanceId,
    pub store: Store,
    pub limits: ConsumerLimits,
    pub poll_interval: Duration,
}

/// State for the dispatcher actor.
pub struct DispatcherState {
    instance: InstanceId,
    store: Store,
    registry: ConsumerRegistry,
    ticker: Option<JoinHandle<()>>,
    listener: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl DispatcherState {
    async fn stop_background(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some((stop, listener)) = self.listener.take() {
            let _ = stop.send(());
            if let Err(e) = listener.await {
                tracing::warn!("Notification listener ended abnormally: {}", e);
            }
        }
    }

    fn stop_consumers(&mut self) {
        for (queue, consumer) in self.registry.drain() {
            tracing::debug!("Stopping consumer for {}", queue);
            consumer.actor.stop(None);
        }
    }
}

async fn spawn_consumer(
    myself: &ActorRef<DispatcherMessage>,
    state: &mut DispatcherState,
    queue: String,
    handler: std::sync::Arc<dyn crate::handler::ErasedHandler>,
) -> Result<(), OrchestratorError> {
    state.registry.check_admissible(&queue)?;

    let args = ConsumerArgs {
        queue: queue.clone(),
        worker_id: state.instance.to_string(),
        store: state.store.clone(),
        handler,
    };
    let (actor, _handle) = Actor::spawn_linked(
        Some(format!("consumer-{}-{}", state.instance, queue)),
        ConsumerActor,
        args,
        myself.get_cell(),
    )
    .await
    .map_err(|e| OrchestratorError::Actor(format!("Failed to spawn consumer: {}", e)))?;

    state.registry.register(
        &queue,
        RegisteredConsumer {
            actor,
            slot: ConsumerSlot::new(),
        },
    )?;

    // First sweep picks up whatever is already waiting.
    if let Err(e) = state.registry.dispatch(&queue) {
        tracing::warn!("Initial sweep of {} not started: {}", queue, e);
    }
    Ok(())
}

/// Dispatcher actor owning the consumers of one orchestrator instance.
pub struct Dispatcher;

impl Actor for Dispatcher {
    type Msg = DispatcherMessage;
    type State = DispatcherState;
    type Arguments = DispatcherArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting dispatcher: {}", args.instance);

        // Push: forward every notification to ourselves.
        let mut subscription = args.store.subscribe().await?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let forward_to = myself.clone();
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    note = subscription.recv() => match note {
                        Some(note) => {
                            if forward_to.send_message(DispatcherMessage::Notify(note)).is_err() {
                                break;
                            }
                        }
                        None => {
                            tracing::warn!("Notification subscription ended; relying on polling");
                            break;
                        }
                    },
                }
            }
            subscription.close().await;
        });

        // Pull: periodic tick as the backstop.
        let myself_clone = myself.clone();
        let poll_interval = args.poll_interval;
        let ticker = tokio::spawn(async move {
            // Registration already sweeps, so the first tick waits a full interval.
            let start = tokio::time::Instant::now() + poll_interval;
            let mut interval = tokio::time::interval_at(start, poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if myself_clone.send_message(DispatcherMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(DispatcherState {
            instance: args.instance,
            store: args.store,
            registry: ConsumerRegistry::new(args.limits),
            ticker: Some(ticker),
            listener: Some((stop_tx, listener)),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DispatcherMessage::Notify(note) => dispatch_notification(state, &note),

            DispatcherMessage::Tick => {
                let started = state.registry.dispatch_idle();
                if started > 0 {
                    tracing::trace!("Poll started {} sweeps", started);
                }
            }

            DispatcherMessage::Register {
                queue,
                handler,
                reply,
            } => {
                let result = spawn_consumer(&myself, state, queue.clone(), handler).await;
                if result.is_ok() {
                    tracing::info!("Registered consumer for {}", queue);
                }
                let _ = reply.send(result);
            }

            DispatcherMessage::ListConsumers { reply } => {
                let _ = reply.send(state.registry.snapshot());
            }

            DispatcherMessage::Shutdown { reply } => {
                tracing::info!("Shutting down dispatcher: {}", state.instance);
                state.stop_background().await;
                state.stop_consumers();
                let _ = reply.send(());
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(queue) = state.registry.unregister_actor(&cell) {
                    tracing::warn!("Consumer for {} terminated: {:?}", queue, reason);
                }
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                if let Some(queue) = state.registry.unregister_actor(&cell) {
                    tracing::error!("Consumer for {} failed: {}", queue, err);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stop_background().await;
        state.stop_consumers();
        Ok(())
    }
}

fn dispatch_notification(state: &DispatcherState, note: &Notification) {
    match state.registry.dispatch(&note.queue) {
        Ok(()) => tracing::debug!("Sweep started for {}", note.description()),
        Err(OrchestratorError::ConsumerBusy(_)) => {
            tracing::debug!("Consumer busy; {} left for the next sweep", note.description())
        }
        Err(OrchestratorError::UnknownConsumer(_)) => {}
        Err(e) => tracing::warn!("Dispatch for {} failed: {}", note.description(), e),
    }
}

/// Start the dispatcher for one orchestrator instance.
pub async fn start_dispatcher(
    args: DispatcherArgs,
) -> Result<(ActorRef<DispatcherMessage>, JoinHandle<()>), ractor::SpawnErr> {
    let name = format!("dispatcher-{}", args.instance);
    Actor::spawn(Some(name), Dispatcher, args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use queue_core::{Job, JobOptions};
    use std::sync::Arc;
    use store::StoreConfig;
    use tokio::sync::Notify;

    use crate::handler::TypedHandler;

    #[tokio::test]
    async fn test_dispatch_while_running_is_rejected() {
        let store = Store::connect(StoreConfig::memory()).await.unwrap();
        store.init().await.unwrap();
        store
            .admit("q", "g", "1", &JobOptions::new(), Utc::now())
            .await
            .unwrap();

        let release = Arc::new(Notify::new());
        let gate = release.clone();
        let handler = TypedHandler::new(move |_job: Job<u32>| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(())
            }
        });

        let (actor, _handle) = Actor::spawn(
            None,
            ConsumerActor,
            ConsumerArgs {
                queue: "q".into(),
                worker_id: InstanceId::new().to_string(),
                store: store.clone(),
                handler: Arc::new(handler),
            },
        )
        .await
        .unwrap();

        let mut registry = ConsumerRegistry::new(ConsumerLimits::default());
        let slot = ConsumerSlot::new();
        registry
            .register(
                "q",
                RegisteredConsumer {
                    actor: actor.clone(),
                    slot: slot.clone(),
                },
            )
            .unwrap();

        registry.dispatch("q").unwrap();
        assert!(matches!(
            registry.dispatch("q"),
            Err(OrchestratorError::ConsumerBusy(_))
        ));
        assert!(matches!(
            registry.dispatch("other"),
            Err(OrchestratorError::UnknownConsumer(_))
        ));

        release.notify_one();
        for _ in 0..100 {
            if slot.status() == queue_core::ConsumerStatus::Sleeping {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(slot.status(), queue_core::ConsumerStatus::Sleeping);
        assert!(registry.dispatch("q").is_ok());

        actor.stop(None);
    }

    #[tokio::test]
    async fn test_registry_enforces_limits_and_duplicates() {
        let store = Store::connect(StoreConfig::memory()).await.unwrap();
        let handler: Arc<dyn crate::handler::ErasedHandler> =
            Arc::new(TypedHandler::new(|_job: Job<u32>| async { Ok(()) }));

        let mut registry = ConsumerRegistry::new(ConsumerLimits { max_consumers: 1 });
        let (actor, _handle) = Actor::spawn(
            None,
            ConsumerActor,
            ConsumerArgs {
                queue: "a".into(),
                worker_id: "w".into(),
                store,
                handler,
            },
        )
        .await
        .unwrap();

        registry
            .register(
                "a",
                RegisteredConsumer {
                    actor: actor.clone(),
                    slot: ConsumerSlot::new(),
                },
            )
            .unwrap();
        assert!(matches!(
            registry.check_admissible("a"),
            Err(OrchestratorError::DuplicateConsumer(_))
        ));
        assert!(matches!(
            registry.check_admissible("b"),
            Err(OrchestratorError::ConsumerLimit { max: 1 })
        ));
        assert_eq!(
            registry.snapshot(),
            vec![("a".to_string(), queue_core::ConsumerStatus::Sleeping)]
        );

        assert_eq!(registry.unregister_actor(&actor.get_cell()).as_deref(), Some("a"));
        assert!(registry.snapshot().is_empty());
        actor.stop(None);
    }
}
