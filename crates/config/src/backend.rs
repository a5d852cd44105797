//! Key-value backend and connection pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `redis://host:port[/db]` or `memory://`
    #[serde(default = "default_url")]
    pub url: String,

    /// Connections kept open while unused
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// Ceiling on simultaneously open connections
    #[serde(default = "default_max_active")]
    pub max_active: usize,

    /// How long a caller waits for a free connection slot
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// How long dialing a new connection may take
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Idle connections older than this are health-checked before reuse
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl BackendConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Whether the in-process backend is selected
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_idle: default_max_idle(),
            max_active: default_max_active(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

pub fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

pub fn default_max_idle() -> usize {
    80
}

pub fn default_max_active() -> usize {
    12_000
}

pub fn default_acquire_timeout_ms() -> u64 {
    5_000
}

pub fn default_connect_timeout_ms() -> u64 {
    5_000
}

pub fn default_idle_timeout_secs() -> u64 {
    240
}
