//! Pooled key-value record store for certsvc.
//!
//! - [`pool`]: bounded connection pool with scoped acquisition
//! - [`backend`]: Redis and in-process backends
//! - [`records`]: certificate record reads and writes
//! - [`codec`]: 8-byte big-endian expiration encoding

pub mod backend;
pub mod codec;
pub mod errors;
pub mod pool;
pub mod records;

pub use backend::{Backend, BackendConnection, MemoryBackend, MEMORY_SCHEME};
pub use errors::{StoreError, StoreResult};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use records::RecordStore;
