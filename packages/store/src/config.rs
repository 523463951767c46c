//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::StoreError;

/// Key prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "groupq";

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections opened eagerly and kept warm.
    pub min_idle: usize,
    /// Ceiling on connections checked out at once.
    pub max_size: usize,
    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 2,
            max_size: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the atomic script bodies come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScriptSource {
    /// Scripts compiled into the binary.
    #[default]
    Embedded,
    /// A directory holding `<name>.lua` files.
    Directory(PathBuf),
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection endpoint: `memory://` or a `redis://` / `rediss://` URL.
    pub endpoint: String,
    /// Optional credentials applied on top of the endpoint URL.
    pub credentials: Option<(Option<String>, String)>,
    /// Prefix for every key and channel.
    pub namespace: String,
    /// Connection pool sizing.
    pub pool: PoolConfig,
    /// Script bodies to register.
    pub scripts: ScriptSource,
    /// How long terminal job records stay readable.
    pub status_retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory://".to_string(),
            credentials: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            pool: PoolConfig::default(),
            scripts: ScriptSource::Embedded,
            status_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl StoreConfig {
    /// Create a config for the in-process engine.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for a standalone Redis server. Cluster is not supported.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            endpoint: url.into(),
            ..Default::default()
        }
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set credentials for authentication. `username` is optional for Redis ACLs.
    pub fn with_credentials(
        mut self,
        username: Option<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username, password.into()));
        self
    }

    /// Set the pool sizing.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Load script bodies from a directory instead of the embedded copies.
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts = ScriptSource::Directory(dir.into());
        self
    }

    /// Set how long terminal job records are kept.
    pub fn with_status_retention(mut self, retention: Duration) -> Self {
        self.status_retention = retention;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.endpoint.starts_with("memory://") || self.endpoint.starts_with("mem://")
    }

    /// Check the values before any connection is opened.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.namespace.is_empty() || self.namespace.contains(char::is_whitespace) {
            return Err(StoreError::InvalidConfig(format!(
                "namespace '{}' must be non-empty without whitespace",
                self.namespace
            )));
        }
        if self.pool.max_size == 0 {
            return Err(StoreError::InvalidConfig(
                "pool max_size must be at least 1".into(),
            ));
        }
        if self.pool.min_idle > self.pool.max_size {
            return Err(StoreError::InvalidConfig(format!(
                "pool min_idle {} exceeds max_size {}",
                self.pool.min_idle, self.pool.max_size
            )));
        }
        Ok(())
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `QUEUE_STORE_BACKEND` is set: use it (`redis`, `memory`)
    /// - Otherwise: redis when `REDIS_URL` is set, memory if not
    ///
    /// Redis env vars:
    /// - `REDIS_URL` (default: `redis://127.0.0.1:6379`)
    /// - `REDIS_USERNAME`, `REDIS_PASSWORD` (optional)
    ///
    /// Common:
    /// - `QUEUE_NAMESPACE` (default: `groupq`)
    /// - `QUEUE_POOL_MIN`, `QUEUE_POOL_MAX`, `QUEUE_POOL_ACQUIRE_TIMEOUT_MS`
    /// - `QUEUE_SCRIPTS_DIR` (optional, overrides the embedded scripts)
    pub fn from_env() -> Result<Self, StoreError> {
        let backend = env_non_empty("QUEUE_STORE_BACKEND");
        let redis_url = env_non_empty("REDIS_URL");

        let mut cfg = match backend.as_deref() {
            Some("redis") => {
                Self::redis(redis_url.unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()))
            }
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StoreError::InvalidConfig(format!(
                    "unsupported QUEUE_STORE_BACKEND={other} (expected redis|memory)"
                )));
            }
            None => match redis_url {
                Some(url) => Self::redis(url),
                None => Self::memory(),
            },
        };

        if let Some(password) = env_non_empty("REDIS_PASSWORD") {
            cfg = cfg.with_credentials(env_non_empty("REDIS_USERNAME"), password);
        }
        if let Some(namespace) = env_non_empty("QUEUE_NAMESPACE") {
            cfg = cfg.with_namespace(namespace);
        }
        if let Some(min_idle) = parse_env::<usize>("QUEUE_POOL_MIN")? {
            cfg.pool.min_idle = min_idle;
        }
        if let Some(max_size) = parse_env::<usize>("QUEUE_POOL_MAX")? {
            cfg.pool.max_size = max_size;
        }
        if let Some(ms) = parse_env::<u64>("QUEUE_POOL_ACQUIRE_TIMEOUT_MS")? {
            cfg.pool.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(dir) = env_non_empty("QUEUE_SCRIPTS_DIR") {
            cfg = cfg.with_scripts_dir(dir);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Read an environment variable, treating blank values as unset.
pub fn env_non_empty(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().and_then(non_empty)
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse an optional numeric environment variable.
pub fn parse_env<T: std::str::FromStr>(var_name: &str) -> Result<Option<T>, StoreError> {
    match env_non_empty(var_name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            StoreError::InvalidConfig(format!("invalid value for {var_name}={raw}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_memory() {
        let cfg = StoreConfig::default();
        assert!(cfg.is_memory());
        assert_eq!(cfg.namespace, DEFAULT_NAMESPACE);
        assert!(cfg.validate().is_ok());
        assert!(!StoreConfig::redis("redis://localhost:6379").is_memory());
    }

    #[test]
    fn test_pool_bounds_are_validated() {
        let cfg = StoreConfig::memory().with_pool(PoolConfig {
            min_idle: 4,
            max_size: 2,
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(StoreError::InvalidConfig(_))));

        let cfg = StoreConfig::memory().with_pool(PoolConfig {
            min_idle: 0,
            max_size: 0,
            ..Default::default()
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_namespace_is_validated() {
        assert!(StoreConfig::memory().with_namespace("").validate().is_err());
        assert!(StoreConfig::memory().with_namespace("a b").validate().is_err());
        assert!(StoreConfig::memory().with_namespace("jobs").validate().is_ok());
    }
}
