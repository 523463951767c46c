//! Store errors.

use std::time::Duration;

use queue_core::ValidationError;
use thiserror::Error;

use crate::scripts::ScriptName;

/// Errors raised by the store and its connection pool.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store config: {0}")]
    InvalidConfig(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("failed to load script '{name}': {source}")]
    ScriptLoad {
        name: ScriptName,
        #[source]
        source: std::io::Error,
    },

    #[error("script '{0}' is not registered - call init first")]
    ScriptMissing(ScriptName),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    /// Whether the error means the connection itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        match self {
            StoreError::Redis(e) => e.is_connection_dropped() || e.is_io_error(),
            _ => false,
        }
    }
}
