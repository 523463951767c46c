//! Built-in log subscriber.

use tracing_subscriber::EnvFilter;

use crate::OrchestratorError;

/// Install a fmt subscriber filtered at `level`.
///
/// `RUST_LOG` takes precedence when set. If the application already installed
/// a global subscriber that one stays in place.
pub fn init_logging(level: &str) -> Result<(), OrchestratorError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| {
            OrchestratorError::Configuration(format!("invalid log level '{}': {}", level, e))
        })?,
    };

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Global subscriber already installed; keeping it");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_harmless() {
        assert!(init_logging("debug").is_ok());
        assert!(init_logging("warn").is_ok());
    }
}
