//! Certificate record persistence.
//!
//! # Layout
//!
//! ```text
//! Domain            (single hash shared by every record)
//! ├── fanatics.com  -> 8-byte big-endian Unix seconds
//! └── shop.net      -> 8-byte big-endian Unix seconds
//! ```
//!
//! Each operation borrows one pooled connection and gives it back before
//! returning. Records are never deleted; an expired record stays until the
//! next `put` for the same domain overwrites it.

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use certsvc_common::{CertificateRecord, DomainName, RECORD_COLLECTION};

use crate::codec::{decode_expiry, encode_expiry};
use crate::errors::{StoreError, StoreResult};
use crate::pool::ConnectionPool;

/// Record store backed by a pooled key-value backend.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: ConnectionPool,
    collection: String,
}

impl RecordStore {
    /// Create a store over the shared `Domain` collection.
    pub fn new(pool: ConnectionPool) -> Self {
        Self::with_collection(pool, RECORD_COLLECTION)
    }

    /// Create a store over a custom collection name.
    pub fn with_collection(pool: ConnectionPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Write (or overwrite) the expiration for a domain.
    pub async fn put(&self, domain: &DomainName, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let value = encode_expiry(expires_at);
        let mut conn = self.pool.acquire().await?;
        conn.hset(&self.collection, domain.as_str(), &value).await?;

        debug!(
            domain = %domain,
            expires_at = %expires_at,
            "Stored certificate record"
        );
        Ok(())
    }

    /// Read the record for a domain.
    ///
    /// Returns [`StoreError::NotFound`] when the domain has never been stored.
    pub async fn get(&self, domain: &DomainName) -> StoreResult<CertificateRecord> {
        let raw = {
            let mut conn = self.pool.acquire().await?;
            conn.hget(&self.collection, domain.as_str()).await?
        };

        let Some(raw) = raw else {
            trace!(domain = %domain, "No stored certificate record");
            return Err(StoreError::NotFound(domain.to_string()));
        };

        let expires_at = decode_expiry(&raw).map_err(|reason| StoreError::CorruptRecord {
            domain: domain.to_string(),
            reason,
        })?;

        trace!(domain = %domain, expires_at = %expires_at, "Loaded certificate record");
        Ok(CertificateRecord {
            domain: domain.clone(),
            expires_at,
        })
    }

    /// Every stored record, sorted by domain name.
    ///
    /// Entries whose name or value cannot be decoded are skipped with a
    /// warning rather than failing the whole listing.
    pub async fn list(&self) -> StoreResult<Vec<CertificateRecord>> {
        let entries = {
            let mut conn = self.pool.acquire().await?;
            conn.hgetall(&self.collection).await?
        };

        let mut records = Vec::with_capacity(entries.len());
        for (name, raw) in entries {
            let domain = match DomainName::parse(&name) {
                Ok(domain) => domain,
                Err(e) => {
                    warn!(field = %name, error = %e, "Skipping stored entry with invalid name");
                    continue;
                }
            };
            match decode_expiry(&raw) {
                Ok(expires_at) => records.push(CertificateRecord { domain, expires_at }),
                Err(reason) => {
                    warn!(domain = %domain, reason = %reason, "Skipping corrupt stored entry");
                }
            }
        }

        records.sort_by(|a, b| a.domain.cmp(&b.domain));
        debug!(count = records.len(), "Listed certificate records");
        Ok(records)
    }

    /// Backend liveness probe through the pool.
    pub async fn ping(&self) -> StoreResult<()> {
        self.pool.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::pool::PoolConfig;
    use chrono::TimeZone;

    fn memory_store() -> (MemoryBackend, RecordStore) {
        let memory = MemoryBackend::new();
        let pool = ConnectionPool::new(Backend::Memory(memory.clone()), PoolConfig::default());
        (memory, RecordStore::new(pool))
    }

    fn domain(name: &str) -> DomainName {
        DomainName::parse(name).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_put_writes_big_endian_value() {
        let (memory, store) = memory_store();
        store.put(&domain("fanatics.com"), at(600)).await.unwrap();

        let raw = memory.raw_value("Domain", "fanatics.com").unwrap();
        assert_eq!(raw, 600i64.to_be_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_memory, store) = memory_store();
        let err = store.get(&domain("missing.com")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_memory, store) = memory_store();
        let name = domain("fanatics.com");

        store.put(&name, at(1_000)).await.unwrap();
        store.put(&name, at(2_000)).await.unwrap();

        let record = store.get(&name).await.unwrap();
        assert_eq!(record.expires_at, at(2_000));
    }

    #[tokio::test]
    async fn test_get_corrupt_value() {
        let (memory, store) = memory_store();
        memory.insert_raw("Domain", "broken.com", b"10 minutes".to_vec());

        let err = store.get(&domain("broken.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
        // The connection is still fine
        assert_eq!(store.pool().idle_count(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted_and_deduplicated() {
        let (memory, store) = memory_store();
        store.put(&domain("b.net"), at(10)).await.unwrap();
        store.put(&domain("a.com"), at(20)).await.unwrap();
        store.put(&domain("b.net"), at(30)).await.unwrap();
        memory.insert_raw("Domain", "not a domain", 5i64.to_be_bytes().to_vec());
        memory.insert_raw("Domain", "short.io", vec![1, 2, 3]);

        let records = store.list().await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(names, vec!["a.com", "b.net"]);
        assert_eq!(records[1].expires_at, at(30));
    }

    #[tokio::test]
    async fn test_list_empty() {
        let (_memory, store) = memory_store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_down() {
        let (memory, store) = memory_store();
        memory.set_online(false);

        let err = store.put(&domain("a.com"), at(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::DialFailed { .. }));
        assert!(store.ping().await.is_err());
        assert_eq!(store.pool().active_count(), 0);
    }

    #[tokio::test]
    async fn test_custom_collection() {
        let memory = MemoryBackend::new();
        let pool = ConnectionPool::new(Backend::Memory(memory.clone()), PoolConfig::default());
        let store = RecordStore::with_collection(pool, "Staging");

        store.put(&domain("a.com"), at(1)).await.unwrap();
        assert!(memory.raw_value("Staging", "a.com").is_some());
        assert!(memory.raw_value("Domain", "a.com").is_none());
    }
}
