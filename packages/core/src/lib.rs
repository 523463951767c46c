//! Core domain types for the grouped job queue.
//!
//! This crate contains the types shared by the store and actor packages:
//! - Job, JobId, JobStatus and the admission options
//! - Queue and group identifiers, consumer status and orchestrator roles
//! - The new-job notification carried on the pub/sub channel

mod error;
mod events;
mod job;
mod queue;

pub use error::ValidationError;
pub use events::Notification;
pub use job::{
    Job, JobId, JobOptions, JobStatus, MAX_WAIT, PRIORITY_LIMIT, PRIORITY_STRIDE, Priority,
};
pub use queue::{ConsumerStatus, InstanceId, Role, validate_identifier};
