//! Consumers registered with one orchestrator instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use queue_core::ConsumerStatus;
use ractor::{ActorCell, ActorRef};

use crate::consumer::ConsumerSlot;
use crate::messages::ConsumerMessage;
use crate::{ConsumerLimits, OrchestratorError};

/// A registered consumer: its actor and its status slot.
pub struct RegisteredConsumer {
    pub actor: ActorRef<ConsumerMessage>,
    pub slot: Arc<ConsumerSlot>,
}

/// Queue name to consumer, owned by the dispatcher.
pub struct ConsumerRegistry {
    consumers: BTreeMap<String, RegisteredConsumer>,
    limits: ConsumerLimits,
}

impl ConsumerRegistry {
    /// Create a new empty registry.
    pub fn new(limits: ConsumerLimits) -> Self {
        Self {
            consumers: BTreeMap::new(),
            limits,
        }
    }

    /// Check that a consumer for `queue` may be added.
    pub fn check_admissible(&self, queue: &str) -> Result<(), OrchestratorError> {
        if self.consumers.contains_key(queue) {
            return Err(OrchestratorError::DuplicateConsumer(queue.to_string()));
        }
        if self.consumers.len() >= self.limits.max_consumers {
            return Err(OrchestratorError::ConsumerLimit {
                max: self.limits.max_consumers,
            });
        }
        Ok(())
    }

    /// Register a consumer actor.
    pub fn register(
        &mut self,
        queue: &str,
        consumer: RegisteredConsumer,
    ) -> Result<(), OrchestratorError> {
        self.check_admissible(queue)?;
        self.consumers.insert(queue.to_string(), consumer);
        Ok(())
    }

    /// Remove the consumer whose actor is `cell`, returning its queue.
    pub fn unregister_actor(&mut self, cell: &ActorCell) -> Option<String> {
        let queue = self
            .consumers
            .iter()
            .find(|(_, c)| c.actor.get_id() == cell.get_id())
            .map(|(queue, _)| queue.clone())?;
        self.consumers.remove(&queue);
        Some(queue)
    }

    /// Registered queue names with their consumer's current status.
    pub fn snapshot(&self) -> Vec<(String, ConsumerStatus)> {
        self.consumers
            .iter()
            .map(|(queue, c)| (queue.clone(), c.slot.status()))
            .collect()
    }

    /// Start a sweep of `queue` if its consumer is sleeping.
    ///
    /// A running consumer rejects the dispatch; jobs stay in the store for the
    /// next trigger.
    pub fn dispatch(&self, queue: &str) -> Result<(), OrchestratorError> {
        let consumer = self
            .consumers
            .get(queue)
            .ok_or_else(|| OrchestratorError::UnknownConsumer(queue.to_string()))?;
        let claim = consumer
            .slot
            .try_claim()
            .ok_or_else(|| OrchestratorError::ConsumerBusy(queue.to_string()))?;
        consumer
            .actor
            .send_message(ConsumerMessage::Sweep { claim })
            .map_err(OrchestratorError::actor)
    }

    /// Dispatch every sleeping consumer. Returns how many sweeps were started.
    pub fn dispatch_idle(&self) -> usize {
        let mut started = 0;
        for queue in self.consumers.keys() {
            match self.dispatch(queue) {
                Ok(()) => started += 1,
                Err(OrchestratorError::ConsumerBusy(_)) => {}
                Err(e) => tracing::warn!("Poll of {} failed: {}", queue, e),
            }
        }
        started
    }

    /// Take every consumer out of the registry.
    pub fn drain(&mut self) -> Vec<(String, RegisteredConsumer)> {
        std::mem::take(&mut self.consumers).into_iter().collect()
    }
}
