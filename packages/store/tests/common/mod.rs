use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use store::{Store, StoreConfig, StoreError};

/// A fresh in-memory store with scripts registered.
pub async fn setup_store() -> Result<Store, StoreError> {
    setup_store_with(StoreConfig::memory()).await
}

pub async fn setup_store_with(config: StoreConfig) -> Result<Store, StoreError> {
    let store = Store::connect(config).await?;
    store.init().await?;
    Ok(store)
}

static LIVE_STORES: AtomicUsize = AtomicUsize::new(0);

/// Config for the server named by `TEST_REDIS_URL`, under a namespace no other test uses.
///
/// Returns `None` when no server is configured so live tests skip.
pub fn live_config() -> Option<StoreConfig> {
    let url = store::env_non_empty("TEST_REDIS_URL")?;
    let namespace = format!(
        "groupq-test-{}-{}",
        std::process::id(),
        LIVE_STORES.fetch_add(1, Ordering::Relaxed)
    );
    Some(
        StoreConfig::redis(url)
            .with_namespace(namespace)
            .with_status_retention(Duration::from_secs(60)),
    )
}

pub async fn live_store() -> Result<Option<Store>, StoreError> {
    match live_config() {
        Some(config) => Ok(Some(setup_store_with(config).await?)),
        None => Ok(None),
    }
}
