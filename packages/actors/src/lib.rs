//! Actor system for the grouped job queue.
//!
//! This crate wires the store into Ractor actors that drain queues fairly
//! across their groups.
//!
//! # Architecture
//!
//! - `Orchestrator` - Facade owning the store and, for subscribers, the dispatcher
//! - `Dispatcher` - Turns notifications and poll ticks into consumer sweeps
//! - `ConsumerActor` - Runs one queue's sweeps, one job at a time
//!
//! # Usage
//!
//! ```ignore
//! use actors::{Orchestrator, OrchestratorConfig};
//!
//! let mut orchestrator = Orchestrator::new(OrchestratorConfig::from_env()?)?;
//! orchestrator.init().await?;
//! orchestrator.process("emails", handler).await?;
//! ```

mod config;
mod consumer;
mod dispatcher;
mod error;
mod handler;
mod logging;
mod messages;
mod orchestrator;
mod registry;

pub use config::{ConsumerLimits, DEFAULT_POLL_INTERVAL, OrchestratorConfig};
pub use error::OrchestratorError;
pub use handler::{HandlerFuture, HandlerResult, JobHandler};
pub use logging::init_logging;
pub use orchestrator::Orchestrator;
