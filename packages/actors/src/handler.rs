//! Job handler trait and its type-erased form.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use queue_core::Job;
use serde::de::DeserializeOwned;
use store::DequeuedJob;

/// Outcome reported by a handler: `Err` carries the failure text stored on the job.
pub type HandlerResult = Result<(), String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Processes jobs whose payload decodes to `P`.
///
/// Any `Fn(Job<P>) -> impl Future<Output = HandlerResult>` closure is a handler.
/// No timeout is imposed; a handler that never resolves keeps its consumer busy.
pub trait JobHandler<P>: Send + Sync + 'static {
    fn handle(&self, job: Job<P>) -> HandlerFuture;
}

impl<P, F, Fut> JobHandler<P> for F
where
    P: Send + 'static,
    F: Fn(Job<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, job: Job<P>) -> HandlerFuture {
        Box::pin((self)(job))
    }
}

/// A handler that takes the job with its payload still encoded.
pub trait ErasedHandler: Send + Sync + 'static {
    fn handle_raw(&self, job: DequeuedJob) -> HandlerFuture;
}

/// Decodes the payload before calling the typed handler.
pub struct TypedHandler<P, H> {
    handler: H,
    _payload: PhantomData<fn() -> P>,
}

impl<P, H> TypedHandler<P, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _payload: PhantomData,
        }
    }
}

impl<P, H> ErasedHandler for TypedHandler<P, H>
where
    P: DeserializeOwned + Send + 'static,
    H: JobHandler<P>,
{
    fn handle_raw(&self, job: DequeuedJob) -> HandlerFuture {
        match serde_json::from_str::<P>(&job.payload) {
            Ok(payload) => self
                .handler
                .handle(Job::new(job.id, job.queue, job.group, payload)),
            Err(e) => {
                tracing::warn!("Malformed payload for job {} in {}: {}", job.id, job.queue, e);
                let error = format!("malformed payload: {}", e);
                Box::pin(async move { Err(error) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::JobId;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Email {
        to: String,
    }

    fn dequeued(payload: &str) -> DequeuedJob {
        DequeuedJob {
            id: JobId::from_sequence(1),
            queue: "emails".into(),
            group: "acme".into(),
            payload: payload.into(),
        }
    }

    #[tokio::test]
    async fn test_closure_handler_receives_decoded_payload() {
        let handler = TypedHandler::new(|job: Job<Email>| async move {
            if job.payload.to == "a@x" && job.group == "acme" {
                Ok(())
            } else {
                Err(format!("unexpected job {:?}", job))
            }
        });

        assert_eq!(handler.handle_raw(dequeued(r#"{"to":"a@x"}"#)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_without_calling_handler() {
        let handler = TypedHandler::new(|_job: Job<Email>| async move {
            Err::<(), String>("handler should not run".into())
        });

        let outcome = handler.handle_raw(dequeued("not json")).await;
        assert!(matches!(outcome, Err(e) if e.starts_with("malformed payload")));
    }

    struct Rejecting;

    impl JobHandler<serde_json::Value> for Rejecting {
        fn handle(&self, job: Job<serde_json::Value>) -> HandlerFuture {
            Box::pin(async move { Err(format!("rejected {}", job.id)) })
        }
    }

    #[tokio::test]
    async fn test_struct_handler_reports_failure() {
        let handler = TypedHandler::new(Rejecting);
        let outcome = handler.handle_raw(dequeued("{}")).await;
        assert_eq!(outcome, Err("rejected 0000000000000001".to_string()));
    }
}
