//! Validation errors for domain values.

use thiserror::Error;

/// Errors raised when a caller-supplied value cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{kind} name must not be empty")]
    EmptyIdentifier { kind: &'static str },

    #[error("{kind} name '{value}' contains ':' or whitespace")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("priority {0} is outside -{limit}..={limit}", limit = crate::PRIORITY_LIMIT)]
    PriorityOutOfRange(i32),

    #[error("{kind} of {wait:?} exceeds the {max:?} limit", max = crate::MAX_WAIT)]
    WaitOutOfRange {
        kind: &'static str,
        wait: std::time::Duration,
    },

    #[error("unknown job status: {0}")]
    UnknownStatus(String),
}
