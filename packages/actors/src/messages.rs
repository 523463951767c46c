//! Message types for actor communication.

use std::sync::Arc;

use queue_core::{ConsumerStatus, Notification};
use ractor::RpcReplyPort;

use crate::consumer::Claim;
use crate::handler::ErasedHandler;
use crate::OrchestratorError;

/// Messages for the Dispatcher.
pub enum DispatcherMessage {
    /// A job was admitted somewhere; sweep its queue if the consumer is idle.
    Notify(Notification),

    /// Periodic poll of every idle consumer.
    Tick,

    /// Register the consumer for a queue and sweep it once.
    Register {
        queue: String,
        handler: Arc<dyn ErasedHandler>,
        reply: RpcReplyPort<Result<(), OrchestratorError>>,
    },

    /// List the queues with a registered consumer and its status.
    ListConsumers {
        reply: RpcReplyPort<Vec<(String, ConsumerStatus)>>,
    },

    /// Stop the timer, the subscription and every consumer.
    Shutdown { reply: RpcReplyPort<()> },
}

impl std::fmt::Debug for DispatcherMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatcherMessage::Notify(note) => f.debug_tuple("Notify").field(note).finish(),
            DispatcherMessage::Tick => f.write_str("Tick"),
            DispatcherMessage::Register { queue, .. } => {
                f.debug_struct("Register").field("queue", queue).finish()
            }
            DispatcherMessage::ListConsumers { .. } => f.write_str("ListConsumers"),
            DispatcherMessage::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Messages for a ConsumerActor.
#[derive(Debug)]
pub enum ConsumerMessage {
    /// Run one sweep of the queue. The claim keeps the consumer RUNNING until dropped.
    Sweep { claim: Claim },
}
