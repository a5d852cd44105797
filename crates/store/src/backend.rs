//! Key-value backends.
//!
//! Records live in a single hash-like collection, so a backend only needs
//! four commands: set a field, get a field, read the whole collection, and
//! a liveness probe.
//!
//! - `redis://host:port[/db]` - Redis, one multiplexed connection per pool slot
//! - `memory://` - in-process hash map with the same semantics, used by tests
//!   and for running without Redis

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::errors::{StoreError, StoreResult};

/// URL scheme of the in-process backend
pub const MEMORY_SCHEME: &str = "memory://";

/// Dial target for pooled connections.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Redis server
    Redis {
        client: redis::Client,
        target: String,
    },
    /// In-process backend
    Memory(MemoryBackend),
}

impl Backend {
    /// Build a backend from its URL.
    pub fn from_url(url: &str) -> StoreResult<Self> {
        if url.starts_with(MEMORY_SCHEME) {
            debug!("Using in-process memory backend");
            return Ok(Backend::Memory(MemoryBackend::new()));
        }

        if !url.starts_with("redis://") {
            return Err(StoreError::InvalidUrl {
                url: url.to_string(),
                reason: "expected a redis:// or memory:// URL".to_string(),
            });
        }

        let client = redis::Client::open(url).map_err(|e| StoreError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(backend = %url, "Using Redis backend");
        Ok(Backend::Redis {
            client,
            target: url.to_string(),
        })
    }

    /// Human-readable dial target
    pub fn target(&self) -> &str {
        match self {
            Backend::Redis { target, .. } => target,
            Backend::Memory(_) => MEMORY_SCHEME,
        }
    }

    /// Open a new connection, failing after `timeout`.
    pub async fn dial(&self, timeout: Duration) -> StoreResult<BackendConnection> {
        match self {
            Backend::Redis { client, target } => {
                let connect = client.get_multiplexed_async_connection();
                match tokio::time::timeout(timeout, connect).await {
                    Ok(Ok(conn)) => Ok(BackendConnection::Redis(conn)),
                    Ok(Err(e)) => Err(StoreError::DialFailed {
                        target: target.clone(),
                        reason: e.to_string(),
                    }),
                    Err(_) => Err(StoreError::DialFailed {
                        target: target.clone(),
                        reason: format!("timed out after {:?}", timeout),
                    }),
                }
            }
            Backend::Memory(memory) => memory.connect(),
        }
    }
}

/// An open connection to a backend.
pub enum BackendConnection {
    /// Redis connection
    Redis(redis::aio::MultiplexedConnection),
    /// In-process connection
    Memory(MemoryConnection),
}

impl BackendConnection {
    /// Set `field` of `collection` to `value`, overwriting any previous value.
    pub async fn hset(&mut self, collection: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        trace!(collection = %collection, field = %field, "HSET");
        match self {
            BackendConnection::Redis(conn) => {
                let _added: i64 = redis::cmd("HSET")
                    .arg(collection)
                    .arg(field)
                    .arg(value)
                    .query_async(conn)
                    .await?;
                Ok(())
            }
            BackendConnection::Memory(conn) => conn.hset(collection, field, value),
        }
    }

    /// Read `field` of `collection`, `None` when absent.
    pub async fn hget(&mut self, collection: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        trace!(collection = %collection, field = %field, "HGET");
        match self {
            BackendConnection::Redis(conn) => {
                let value: Option<Vec<u8>> = redis::cmd("HGET")
                    .arg(collection)
                    .arg(field)
                    .query_async(conn)
                    .await?;
                Ok(value)
            }
            BackendConnection::Memory(conn) => conn.hget(collection, field),
        }
    }

    /// Read every field of `collection`.
    pub async fn hgetall(&mut self, collection: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
        trace!(collection = %collection, "HGETALL");
        match self {
            BackendConnection::Redis(conn) => {
                let entries: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
                    .arg(collection)
                    .query_async(conn)
                    .await?;
                Ok(entries)
            }
            BackendConnection::Memory(conn) => conn.hgetall(collection),
        }
    }

    /// Liveness probe.
    pub async fn ping(&mut self) -> StoreResult<()> {
        match self {
            BackendConnection::Redis(conn) => {
                let reply: String = redis::cmd("PING").query_async(conn).await?;
                if reply == "PONG" {
                    Ok(())
                } else {
                    Err(StoreError::Backend(format!("unexpected PING reply: {}", reply)))
                }
            }
            BackendConnection::Memory(conn) => conn.ping(),
        }
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConnection::Redis(_) => f.write_str("BackendConnection::Redis"),
            BackendConnection::Memory(_) => f.write_str("BackendConnection::Memory"),
        }
    }
}

// ============================================================================
// In-process backend
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    /// collection -> (field -> value)
    collections: DashMap<String, DashMap<String, Vec<u8>>>,
    /// When set, dials and commands fail as if the server were down
    offline: AtomicBool,
    /// Commands executed, PING included
    operations: AtomicU64,
    /// Connections opened
    dials: AtomicU64,
}

/// In-process backend with hash semantics.
///
/// Clones share the same data, so a test can keep a handle for inspection
/// while the pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the server going down (`false`) or coming back (`true`).
    pub fn set_online(&self, online: bool) {
        self.inner.offline.store(!online, Ordering::Relaxed);
        debug!(online = online, "Memory backend availability changed");
    }

    /// Number of commands executed so far
    pub fn operation_count(&self) -> u64 {
        self.inner.operations.load(Ordering::Relaxed)
    }

    /// Number of connections opened so far
    pub fn dial_count(&self) -> u64 {
        self.inner.dials.load(Ordering::Relaxed)
    }

    /// Raw value of a field, bypassing connection accounting
    pub fn raw_value(&self, collection: &str, field: &str) -> Option<Vec<u8>> {
        self.inner
            .collections
            .get(collection)
            .and_then(|fields| fields.get(field).map(|v| v.value().clone()))
    }

    /// Store a raw value, bypassing connection accounting
    pub fn insert_raw(&self, collection: &str, field: &str, value: Vec<u8>) {
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    fn connect(&self) -> StoreResult<BackendConnection> {
        if self.inner.offline.load(Ordering::Relaxed) {
            return Err(StoreError::DialFailed {
                target: MEMORY_SCHEME.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.inner.dials.fetch_add(1, Ordering::Relaxed);
        Ok(BackendConnection::Memory(MemoryConnection {
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// Connection to a [`MemoryBackend`].
pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
}

impl MemoryConnection {
    fn begin(&self) -> StoreResult<()> {
        self.inner.operations.fetch_add(1, Ordering::Relaxed);
        if self.inner.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Backend("connection reset by peer".to_string()));
        }
        Ok(())
    }

    fn hset(&self, collection: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        self.begin()?;
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    fn hget(&self, collection: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        self.begin()?;
        Ok(self
            .inner
            .collections
            .get(collection)
            .and_then(|fields| fields.get(field).map(|v| v.value().clone())))
    }

    fn hgetall(&self, collection: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
        self.begin()?;
        Ok(self
            .inner
            .collections
            .get(collection)
            .map(|fields| {
                fields
                    .iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn ping(&self) -> StoreResult<()> {
        self.begin()
    }
}
