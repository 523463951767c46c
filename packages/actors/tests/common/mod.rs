use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{Orchestrator, OrchestratorConfig, OrchestratorError};
use queue_core::{ConsumerStatus, Job};
use store::{Store, StoreConfig};

/// A memory store shared by the instances of one test.
pub async fn shared_store() -> Result<Store, OrchestratorError> {
    let store = Store::connect(StoreConfig::memory()).await?;
    store.init().await?;
    Ok(store)
}

/// An initialized subscriber over `store` that only polls every `poll`.
pub async fn subscriber(store: &Store, poll: Duration) -> Result<Orchestrator, OrchestratorError> {
    let config = OrchestratorConfig::subscriber(StoreConfig::memory()).with_poll_interval(poll);
    let mut orchestrator = Orchestrator::with_store(config, store.clone())?;
    orchestrator.init().await?;
    Ok(orchestrator)
}

/// An initialized publisher over `store`.
pub async fn publisher(store: &Store) -> Result<Orchestrator, OrchestratorError> {
    let config = OrchestratorConfig::publisher(StoreConfig::memory());
    let mut orchestrator = Orchestrator::with_store(config, store.clone())?;
    orchestrator.init().await?;
    Ok(orchestrator)
}

/// Payloads seen by a handler, in delivery order.
pub type Seen<P> = Arc<Mutex<Vec<P>>>;

/// A handler that records every payload and succeeds.
pub fn recording<P: Send + 'static>() -> (
    Seen<P>,
    impl Fn(Job<P>) -> std::future::Ready<Result<(), String>> + Send + Sync + 'static,
) {
    let seen: Seen<P> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = move |job: Job<P>| {
        sink.lock().unwrap().push(job.payload);
        std::future::ready(Ok(()))
    };
    (seen, handler)
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn snapshot<P: Clone>(seen: &Seen<P>) -> Vec<P> {
    seen.lock().unwrap().clone()
}

/// Wait until the consumer of `queue` has finished its current sweep.
pub async fn wait_idle(orchestrator: &Orchestrator, queue: &str) -> bool {
    wait_until(Duration::from_secs(5), || async {
        orchestrator
            .consumers()
            .await
            .map(|consumers| {
                consumers
                    .iter()
                    .any(|(q, status)| q == queue && *status == ConsumerStatus::Sleeping)
            })
            .unwrap_or(false)
    })
    .await
}
