//! Orchestrator configuration.

use std::time::Duration;

use queue_core::Role;
use store::{StoreConfig, env_non_empty, parse_env};

use crate::OrchestratorError;

/// Default interval of the fallback poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bounds on what one orchestrator registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerLimits {
    /// Most queue consumers this instance will register.
    pub max_consumers: usize,
}

impl Default for ConsumerLimits {
    fn default() -> Self {
        Self { max_consumers: 64 }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub store: StoreConfig,
    pub role: Role,
    pub consumer_limits: ConsumerLimits,
    /// Filter directive for the built-in log subscriber; `None` installs nothing.
    pub log_level: Option<String>,
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            role: Role::Publisher,
            consumer_limits: ConsumerLimits::default(),
            log_level: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl OrchestratorConfig {
    pub fn new(store: StoreConfig, role: Role) -> Self {
        Self {
            store,
            role,
            ..Default::default()
        }
    }

    pub fn publisher(store: StoreConfig) -> Self {
        Self::new(store, Role::Publisher)
    }

    pub fn subscriber(store: StoreConfig) -> Self {
        Self::new(store, Role::Subscriber)
    }

    pub fn with_consumer_limits(mut self, limits: ConsumerLimits) -> Self {
        self.consumer_limits = limits;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the values before anything is started.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        self.store.validate()?;
        if self.poll_interval.is_zero() {
            return Err(OrchestratorError::Configuration(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.consumer_limits.max_consumers == 0 {
            return Err(OrchestratorError::Configuration(
                "max_consumers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build a config from environment variables.
    ///
    /// Store settings come from [`StoreConfig::from_env`]. On top of those:
    /// - `QUEUE_ROLE` (`publisher` | `subscriber`, default: publisher)
    /// - `QUEUE_LOG_LEVEL` (optional filter directive, e.g. `info`)
    /// - `QUEUE_POLL_INTERVAL_MS` (default: 1000)
    /// - `QUEUE_MAX_CONSUMERS` (default: 64)
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let mut cfg = Self {
            store: StoreConfig::from_env()?,
            ..Default::default()
        };

        if let Some(role) = env_non_empty("QUEUE_ROLE") {
            cfg.role = role.parse().map_err(OrchestratorError::Configuration)?;
        }
        cfg.log_level = env_non_empty("QUEUE_LOG_LEVEL");
        if let Some(ms) = parse_env::<u64>("QUEUE_POLL_INTERVAL_MS")? {
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_env::<usize>("QUEUE_MAX_CONSUMERS")? {
            cfg.consumer_limits.max_consumers = max;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
