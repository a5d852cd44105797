//! HTTP server configuration.

use serde::{Deserialize, Serialize};

/// HTTP surface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

pub fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
