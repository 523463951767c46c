//! Live subscription to the new-job notification channel.

use queue_core::Notification;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Receives notifications until closed.
///
/// A background task owns the underlying channel connection and forwards
/// every decoded message here.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Notification>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Notification>,
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Next notification, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Unsubscribe and wait for the forwarding task to finish. Idempotent.
    pub async fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Subscription task ended abnormally: {}", e);
            }
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
