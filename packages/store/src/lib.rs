//! Job store for the grouped queue.
//!
//! Provides atomic admission, per-group dequeue and status tracking over
//! Redis (Lua scripts, pooled connections, pub/sub) or an in-process engine.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use queue_core::JobOptions;
//! use store::{Store, StoreConfig};
//!
//! # async fn demo() -> Result<(), store::StoreError> {
//! let store = Store::connect(StoreConfig::redis("redis://127.0.0.1:6379")).await?;
//! store.init().await?;
//!
//! let id = store
//!     .admit("emails", "acme", r#"{"to":"a@x"}"#, &JobOptions::new(), Utc::now())
//!     .await?;
//! println!("status: {:?}", store.status(&id).await?);
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod keys;
#[cfg(feature = "memory")]
mod memory;
pub mod pool;
mod redis_engine;
pub mod scripts;
mod subscription;
mod sweep;

pub use config::{
    DEFAULT_NAMESPACE, PoolConfig, ScriptSource, StoreConfig, env_non_empty, parse_env,
};
pub use engine::{DequeuedJob, Store};
pub use error::StoreError;
pub use keys::Keys;
pub use subscription::Subscription;
pub use sweep::Sweep;
