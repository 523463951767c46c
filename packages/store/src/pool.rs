//! Bounded connection pool.
//!
//! A semaphore sized to `max_size` caps checked-out connections; idle
//! connections wait in a stack and are reused before new ones are opened.
//! Guards return their connection on drop.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{PoolConfig, StoreError};

/// Opens and closes connections for a [`Pool`].
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, StoreError>> + Send;

    /// Terminate the connection's session before it is discarded.
    fn close(&self, conn: Self::Connection) -> impl Future<Output = ()> + Send;
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    idle: Mutex<Vec<M::Connection>>,
    permits: Arc<Semaphore>,
    config: PoolConfig,
    closed: AtomicBool,
}

impl<M: ManageConnection> PoolInner<M> {
    fn idle(&self) -> MutexGuard<'_, Vec<M::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

/// A fixed-ceiling pool of store connections.
pub struct Pool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Build a pool and open `min_idle` warm connections.
    pub async fn new(manager: M, config: PoolConfig) -> Result<Self, StoreError> {
        let mut warm = Vec::with_capacity(config.min_idle);
        for _ in 0..config.min_idle {
            warm.push(manager.connect().await?);
        }
        tracing::debug!(
            "Connection pool ready: {} warm, {} max",
            warm.len(),
            config.max_size
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(config.max_size)),
                manager,
                idle: Mutex::new(warm),
                config,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Check out a connection, waiting up to the acquire timeout when all are in use.
    pub async fn acquire(&self) -> Result<PooledConnection<M>, StoreError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StoreError::PoolClosed);
        }

        let timeout = self.inner.config.acquire_timeout;
        let permit = tokio::time::timeout(timeout, self.inner.permits.clone().acquire_owned())
            .await
            .map_err(|_| StoreError::PoolTimeout(timeout))?
            .map_err(|_| StoreError::PoolClosed)?;

        let reused = self.inner.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => self.inner.manager.connect().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Current usage.
    pub fn state(&self) -> PoolState {
        let max_size = self.inner.config.max_size;
        PoolState {
            idle: self.inner.idle().len(),
            in_use: max_size - self.inner.permits.available_permits(),
            max_size,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Reject new acquisitions and gracefully close every idle connection.
    ///
    /// Connections still checked out are closed when their guards drop.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();

        let idle: Vec<_> = self.inner.idle().drain(..).collect();
        let count = idle.len();
        for conn in idle {
            self.inner.manager.close(conn).await;
        }
        tracing::debug!("Connection pool closed ({} idle connections terminated)", count);
    }
}

/// A connection checked out of a [`Pool`]; returned to the pool on drop.
pub struct PooledConnection<M: ManageConnection> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// Close the connection instead of returning it, e.g. after a transport error.
    pub async fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.manager.close(conn).await;
        }
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the connection, and both consume the guard.
        self.conn.as_ref().expect("pooled connection already released")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already released")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if !self.pool.closed.load(Ordering::Acquire) {
            self.pool.idle().push(conn);
            return;
        }

        // The pool shut down while this connection was out.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = self.pool.clone();
                handle.spawn(async move { pool.manager.close(conn).await });
            }
            Err(_) => drop(conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl ManageConnection for Counting {
        type Connection = usize;

        async fn connect(&self) -> Result<usize, StoreError> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }

        async fn close(&self, _conn: usize) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(min_idle: usize, max_size: usize) -> PoolConfig {
        PoolConfig {
            min_idle,
            max_size,
            acquire_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_warm_connections_are_reused() {
        let pool = Pool::new(Counting::default(), config(2, 4)).await.unwrap();
        assert_eq!(pool.state().idle, 2);

        let first = pool.acquire().await.unwrap();
        let id = *first;
        drop(first);

        let again = pool.acquire().await.unwrap();
        assert_eq!(*again, id);
        assert_eq!(pool.inner.manager.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_acquire_beyond_ceiling_waits_then_times_out() {
        let pool = Pool::new(Counting::default(), config(0, 1)).await.unwrap();
        let held = pool.acquire().await.unwrap();
        assert_eq!(pool.state().in_use, 1);

        let err = pool.acquire().await.err();
        assert!(matches!(err, Some(StoreError::PoolTimeout(_))));

        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_release_wakes_waiter() {
        let pool = Pool::new(Counting::default(), config(0, 1)).await.unwrap();
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| *c) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        let got = waiter.await.unwrap();
        assert_eq!(got.ok(), Some(0));
    }

    #[tokio::test]
    async fn test_close_terminates_idle_and_rejects_acquire() {
        let manager = Counting::default();
        let closed = manager.closed.clone();
        let pool = Pool::new(manager, config(3, 3)).await.unwrap();

        pool.close().await;
        assert!(pool.is_closed());
        assert_eq!(closed.load(Ordering::SeqCst), 3);
        assert!(matches!(pool.acquire().await, Err(StoreError::PoolClosed)));

        // Second close is a no-op.
        pool.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_discard_closes_instead_of_returning() {
        let manager = Counting::default();
        let closed = manager.closed.clone();
        let pool = Pool::new(manager, config(1, 2)).await.unwrap();

        let conn = pool.acquire().await.unwrap();
        conn.discard().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.state().idle, 0);
        assert_eq!(pool.state().in_use, 0);
    }
}
