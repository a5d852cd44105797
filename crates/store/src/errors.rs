//! Record store error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the domain. An expected outcome, not a failure.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Every connection slot stayed busy for the whole acquire timeout.
    #[error("connection pool exhausted: {max_active} connections in use after {waited:?}")]
    PoolExhausted { max_active: usize, waited: Duration },

    /// A new backend connection could not be established.
    #[error("failed to dial backend {target}: {reason}")]
    DialFailed { target: String, reason: String },

    /// The backend rejected a command or the connection broke mid-command.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored value does not decode to an expiration timestamp.
    #[error("corrupt record for {domain}: {reason}")]
    CorruptRecord { domain: String, reason: String },

    /// The backend URL cannot be used.
    #[error("invalid backend URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The pool was closed during shutdown.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl StoreError {
    /// Whether this error is the expected "no such record" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether a connection that produced this error must not be reused
    pub fn breaks_connection(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
