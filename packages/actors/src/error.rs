//! Orchestrator errors.

use queue_core::{Role, ValidationError};
use store::StoreError;
use thiserror::Error;

/// Errors raised by the orchestrator and its actors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("orchestrator is not initialized")]
    NotInitialized,

    #[error("orchestrator is closed")]
    Closed,

    #[error("role {0} cannot process jobs")]
    WrongRole(Role),

    #[error("queue '{0}' already has a consumer")]
    DuplicateConsumer(String),

    #[error("consumer limit of {max} reached")]
    ConsumerLimit { max: usize },

    #[error("no consumer registered for queue '{0}'")]
    UnknownConsumer(String),

    #[error("consumer for queue '{0}' is busy")]
    ConsumerBusy(String),
}

impl OrchestratorError {
    pub(crate) fn actor(e: impl std::fmt::Display) -> Self {
        OrchestratorError::Actor(e.to_string())
    }
}
