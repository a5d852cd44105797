//! Bounded backend connection pool.
//!
//! Every store operation borrows exactly one connection through
//! [`ConnectionPool::acquire`]. The returned [`PooledConnection`] gives the
//! connection back when dropped, so release happens on every exit path:
//! success, error, early return, or panic unwinding.
//!
//! Capacity is enforced with a semaphore sized to `max_active`. Callers at
//! the ceiling wait up to `acquire_timeout` for a slot and then fail with
//! [`StoreError::PoolExhausted`]; the pool never dials past the ceiling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::backend::{Backend, BackendConnection};
use crate::errors::{StoreError, StoreResult};

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections kept open while unused
    pub max_idle: usize,
    /// Maximum connections open at once (in use plus being dialed)
    pub max_active: usize,
    /// How long `acquire` waits for a free slot
    pub acquire_timeout: Duration,
    /// How long dialing a new connection may take
    pub connect_timeout: Duration,
    /// Idle connections older than this are pinged before reuse
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 80,
            max_active: 12_000,
            acquire_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(240),
        }
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently borrowed
    pub active: usize,
    /// Connections parked in the idle list
    pub idle: usize,
    /// Configured ceiling
    pub max_active: usize,
    /// Connections dialed since creation
    pub total_dialed: u64,
    /// Dial attempts that failed
    pub dial_failures: u64,
}

/// A parked connection.
struct IdleConnection {
    conn: BackendConnection,
    idle_since: Instant,
}

struct PoolInner {
    backend: Backend,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConnection>>,
    total_dialed: AtomicU64,
    dial_failures: AtomicU64,
}

/// Backend connection pool.
///
/// Cheap to clone; clones share the same connections and limits.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool. No connection is dialed until the first `acquire`.
    pub fn new(backend: Backend, config: PoolConfig) -> Self {
        let max_active = config.max_active.max(1);
        let max_idle = config.max_idle.min(max_active);

        if max_idle != config.max_idle {
            warn!(
                max_idle = config.max_idle,
                max_active = max_active,
                "max_idle exceeds max_active, clamping"
            );
        }

        let config = PoolConfig {
            max_idle,
            max_active,
            ..config
        };

        info!(
            backend = %backend.target(),
            max_idle = config.max_idle,
            max_active = config.max_active,
            acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
            "Backend connection pool initialized"
        );

        Self {
            inner: Arc::new(PoolInner {
                backend,
                permits: Arc::new(Semaphore::new(config.max_active)),
                config,
                idle: Mutex::new(Vec::new()),
                total_dialed: AtomicU64::new(0),
                dial_failures: AtomicU64::new(0),
            }),
        }
    }

    /// The backend this pool dials
    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    /// Effective configuration (after clamping)
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Borrow a connection.
    ///
    /// Reuses the most recently parked idle connection when one exists,
    /// otherwise dials a new one.
    pub async fn acquire(&self) -> StoreResult<PooledConnection> {
        let config = &self.inner.config;
        let started = Instant::now();

        let permit = match tokio::time::timeout(
            config.acquire_timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(StoreError::PoolClosed),
            Err(_) => {
                warn!(
                    max_active = config.max_active,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Connection pool exhausted"
                );
                return Err(StoreError::PoolExhausted {
                    max_active: config.max_active,
                    waited: config.acquire_timeout,
                });
            }
        };

        let conn = match self.take_idle().await {
            Some(conn) => conn,
            None => self.dial().await?,
        };

        trace!(
            active = self.active_count(),
            wait_us = started.elapsed().as_micros() as u64,
            "Acquired backend connection"
        );

        Ok(PooledConnection {
            conn: Some(conn),
            broken: false,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Acquire a connection and issue a liveness probe.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.acquire().await?;
        conn.ping().await
    }

    /// Connections currently borrowed
    pub fn active_count(&self) -> usize {
        self.inner.config.max_active - self.inner.permits.available_permits()
    }

    /// Connections parked in the idle list
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Snapshot of pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.active_count(),
            idle: self.idle_count(),
            max_active: self.inner.config.max_active,
            total_dialed: self.inner.total_dialed.load(Ordering::Relaxed),
            dial_failures: self.inner.dial_failures.load(Ordering::Relaxed),
        }
    }

    /// Close the pool: pending and future `acquire` calls fail with
    /// [`StoreError::PoolClosed`] and idle connections are dropped.
    /// Borrowed connections are closed when their guards drop.
    pub fn close(&self) {
        self.inner.permits.close();
        let drained = {
            let mut idle = self.inner.idle.lock();
            let n = idle.len();
            idle.clear();
            n
        };
        info!(idle_closed = drained, "Backend connection pool closed");
    }

    /// Pop idle connections until one is usable.
    async fn take_idle(&self) -> Option<BackendConnection> {
        loop {
            let candidate = self.inner.idle.lock().pop()?;
            if candidate.idle_since.elapsed() < self.inner.config.idle_timeout {
                return Some(candidate.conn);
            }

            let mut conn = candidate.conn;
            match conn.ping().await {
                Ok(()) => {
                    trace!("Stale idle connection passed health check");
                    return Some(conn);
                }
                Err(e) => {
                    debug!(error = %e, "Discarding idle connection that failed health check");
                }
            }
        }
    }

    async fn dial(&self) -> StoreResult<BackendConnection> {
        match self.inner.backend.dial(self.inner.config.connect_timeout).await {
            Ok(conn) => {
                let total = self.inner.total_dialed.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    backend = %self.inner.backend.target(),
                    total_dialed = total,
                    "Dialed backend connection"
                );
                Ok(conn)
            }
            Err(e) => {
                self.inner.dial_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    backend = %self.inner.backend.target(),
                    error = %e,
                    "Failed to dial backend"
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.inner.backend.target())
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A borrowed connection, returned to the pool on drop.
///
/// A connection that produced a backend error is marked broken and closed
/// instead of being parked.
pub struct PooledConnection {
    conn: Option<BackendConnection>,
    broken: bool,
    pool: Arc<PoolInner>,
    // Released after `drop` has parked the connection
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Set a field of a collection.
    pub async fn hset(&mut self, collection: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        let result = self.connection()?.hset(collection, field, value).await;
        self.observe(result)
    }

    /// Read a field of a collection.
    pub async fn hget(&mut self, collection: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = self.connection()?.hget(collection, field).await;
        self.observe(result)
    }

    /// Read every field of a collection.
    pub async fn hgetall(
        &mut self,
        collection: &str,
    ) -> StoreResult<std::collections::HashMap<String, Vec<u8>>> {
        let result = self.connection()?.hgetall(collection).await;
        self.observe(result)
    }

    /// Liveness probe.
    pub async fn ping(&mut self) -> StoreResult<()> {
        let result = self.connection()?.ping().await;
        self.observe(result)
    }

    /// Prevent this connection from being reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    fn connection(&mut self) -> StoreResult<&mut BackendConnection> {
        self.conn.as_mut().ok_or(StoreError::PoolClosed)
    }

    fn observe<T>(&mut self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(ref e) = result {
            if e.breaks_connection() {
                debug!(error = %e, "Marking backend connection broken");
                self.broken = true;
            }
        }
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if self.broken || self.pool.permits.is_closed() || std::thread::panicking() {
            trace!("Closing backend connection");
            return;
        }

        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.config.max_idle {
            idle.push(IdleConnection {
                conn,
                idle_since: Instant::now(),
            });
            trace!(idle = idle.len(), "Returned backend connection to pool");
        } else {
            trace!(idle = idle.len(), "Idle list full, closing backend connection");
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("broken", &self.broken)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn memory_pool(config: PoolConfig) -> (MemoryBackend, ConnectionPool) {
        let memory = MemoryBackend::new();
        let pool = ConnectionPool::new(Backend::Memory(memory.clone()), config);
        (memory, pool)
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_idle, 80);
        assert_eq!(config.max_active, 12_000);
    }

    #[test]
    fn test_max_idle_clamped_to_max_active() {
        let (_memory, pool) = memory_pool(PoolConfig {
            max_idle: 10,
            max_active: 2,
            ..Default::default()
        });
        assert_eq!(pool.config().max_idle, 2);
    }

    #[tokio::test]
    async fn test_release_on_drop_reuses_connection() {
        let (memory, pool) = memory_pool(PoolConfig::default());

        {
            let mut conn = pool.acquire().await.unwrap();
            conn.ping().await.unwrap();
            assert_eq!(pool.active_count(), 1);
        }
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(memory.dial_count(), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_release_on_error_path() {
        let (memory, pool) = memory_pool(PoolConfig::default());

        async fn failing_op(pool: &ConnectionPool) -> StoreResult<()> {
            let mut conn = pool.acquire().await?;
            conn.ping().await?;
            Err(StoreError::NotFound("a.com".into()))
        }

        assert!(failing_op(&pool).await.is_err());
        assert_eq!(pool.active_count(), 0);
        // Non-backend errors leave the connection reusable
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(memory.dial_count(), 1);
    }

    #[tokio::test]
    async fn test_broken_connection_is_discarded() {
        let (memory, pool) = memory_pool(PoolConfig::default());

        {
            let mut conn = pool.acquire().await.unwrap();
            memory.set_online(false);
            assert!(conn.ping().await.is_err());
        }
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_list_bounded_by_max_idle() {
        let (_memory, pool) = memory_pool(PoolConfig {
            max_idle: 2,
            max_active: 8,
            ..Default::default()
        });

        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pool.acquire().await.unwrap());
        }
        assert_eq!(pool.active_count(), 5);
        drop(held);

        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_fails_at_ceiling() {
        let (_memory, pool) = memory_pool(PoolConfig {
            max_idle: 1,
            max_active: 1,
            acquire_timeout: Duration::from_millis(100),
            ..Default::default()
        });

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, StoreError::PoolExhausted { max_active: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let (_memory, pool) = memory_pool(PoolConfig {
            max_idle: 1,
            max_active: 1,
            acquire_timeout: Duration::from_secs(1),
            ..Default::default()
        });

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_dial_failure_releases_slot() {
        let (memory, pool) = memory_pool(PoolConfig {
            max_active: 1,
            ..Default::default()
        });

        memory.set_online(false);
        assert!(matches!(
            pool.acquire().await,
            Err(StoreError::DialFailed { .. })
        ));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.stats().dial_failures, 1);

        memory.set_online(true);
        assert!(pool.ping().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_idle_connection_is_checked() {
        let (memory, pool) = memory_pool(PoolConfig {
            idle_timeout: Duration::from_secs(10),
            ..Default::default()
        });

        drop(pool.acquire().await.unwrap());
        let ops_before = memory.operation_count();

        tokio::time::advance(Duration::from_secs(11)).await;
        let _conn = pool.acquire().await.unwrap();

        // Health check PING on borrow, no redial
        assert_eq!(memory.operation_count(), ops_before + 1);
        assert_eq!(memory.dial_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let (_memory, pool) = memory_pool(PoolConfig::default());
        drop(pool.acquire().await.unwrap());

        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(pool.acquire().await, Err(StoreError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_ping_offline_backend() {
        let (memory, pool) = memory_pool(PoolConfig::default());
        memory.set_online(false);
        assert!(pool.ping().await.is_err());
    }
}
