//! Per-queue consumer: the SLEEPING/RUNNING slot and the actor that runs sweeps.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::FutureExt;
use queue_core::{ConsumerStatus, JobStatus};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use store::{DequeuedJob, Store, Sweep};

use crate::handler::ErasedHandler;
use crate::messages::ConsumerMessage;

/// Status of one queue's consumer, shared by the dispatcher and the actor.
#[derive(Debug, Default)]
pub struct ConsumerSlot {
    status: Mutex<ConsumerStatus>,
}

impl ConsumerSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, ConsumerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ConsumerStatus {
        *self.lock()
    }

    /// Move SLEEPING to RUNNING in one step. `None` means the consumer is busy.
    pub fn try_claim(self: &Arc<Self>) -> Option<Claim> {
        let mut status = self.lock();
        match *status {
            ConsumerStatus::Running => None,
            ConsumerStatus::Sleeping => {
                *status = ConsumerStatus::Running;
                Some(Claim { slot: self.clone() })
            }
        }
    }
}

/// Proof that a consumer is RUNNING. Dropping it puts the consumer back to sleep.
#[derive(Debug)]
pub struct Claim {
    slot: Arc<ConsumerSlot>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        *self.slot.lock() = ConsumerStatus::Sleeping;
    }
}

/// Consumer actor arguments.
pub struct ConsumerArgs {
    pub queue: String,
    pub worker_id: String,
    pub store: Store,
    pub handler: Arc<dyn ErasedHandler>,
}

/// State for the consumer actor.
pub struct ConsumerState {
    queue: String,
    worker_id: String,
    store: Store,
    handler: Arc<dyn ErasedHandler>,
    /// Jobs handed to the handler since start.
    processed: u64,
}

impl ConsumerState {
    /// Run the handler for one job and record the outcome.
    async fn run_job(&mut self, job: DequeuedJob) {
        let id = job.id.clone();
        tracing::debug!("Processing job {} from {}/{}", id, job.queue, job.group);

        // A panicking handler fails its job, not the consumer.
        let handler = &self.handler;
        let outcome = match AssertUnwindSafe(async move { handler.handle_raw(job).await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(format!("handler panicked: {}", panic_message(panic.as_ref()))),
        };
        self.processed += 1;

        let (status, error) = match &outcome {
            Ok(()) => (JobStatus::Completed, None),
            Err(e) => {
                tracing::warn!("Job {} in {} failed: {}", id, self.queue, e);
                (JobStatus::Failed, Some(e.as_str()))
            }
        };

        match self
            .store
            .update_status(&id, status, error, Utc::now())
            .await
        {
            Ok(true) => tracing::debug!("Job {} {}", id, status),
            Ok(false) => tracing::warn!("Job {} vanished before its {} report", id, status),
            Err(e) => tracing::warn!("Failed to record {} for job {}: {}", status, id, e),
        }
    }

    /// Visit every group once, handing at most one job per group to the handler.
    async fn sweep(&mut self) {
        let mut sweep = match Sweep::start(&self.store, &self.queue, &self.worker_id).await {
            Ok(sweep) => sweep,
            Err(e) => {
                tracing::warn!("Cannot list groups of {}: {}", self.queue, e);
                return;
            }
        };

        while !sweep.is_finished() {
            match sweep.next_job(&self.store, Utc::now()).await {
                Ok(Some(job)) => self.run_job(job).await,
                Ok(None) => break,
                // The failing group is already consumed from the sweep; move on.
                Err(e) => tracing::warn!("Dequeue from {} failed: {}", self.queue, e),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Actor that drains one queue, one job at a time.
pub struct ConsumerActor;

impl Actor for ConsumerActor {
    type Msg = ConsumerMessage;
    type State = ConsumerState;
    type Arguments = ConsumerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting consumer: {}", args.queue);

        Ok(ConsumerState {
            queue: args.queue,
            worker_id: args.worker_id,
            store: args.store,
            handler: args.handler,
            processed: 0,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConsumerMessage::Sweep { claim } => {
                state.sweep().await;
                drop(claim);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Consumer for {} stopped after {} jobs",
            state.queue,
            state.processed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_rejected_while_running() {
        let slot = ConsumerSlot::new();
        assert_eq!(slot.status(), ConsumerStatus::Sleeping);

        let claim = slot.try_claim();
        assert!(claim.is_some());
        assert_eq!(slot.status(), ConsumerStatus::Running);
        assert!(slot.try_claim().is_none());

        drop(claim);
        assert_eq!(slot.status(), ConsumerStatus::Sleeping);
        assert!(slot.try_claim().is_some());
    }

    #[test]
    fn test_claim_released_when_dropped_during_unwind() {
        let slot = ConsumerSlot::new();
        let held = slot.clone();
        let result = std::panic::catch_unwind(move || {
            let _claim = held.try_claim();
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert_eq!(slot.status(), ConsumerStatus::Sleeping);
    }

    #[test]
    fn test_panic_message_reads_both_payload_kinds() {
        let literal = std::panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(literal.as_ref()), "plain");

        let formatted = std::panic::catch_unwind(|| panic!("job {}", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "job 7");

        let other = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
