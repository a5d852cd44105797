//! Configuration for the certsvc certificate record service.
//!
//! Configuration is a KDL document with three optional blocks:
//!
//! ```kdl
//! server {
//!     listen "0.0.0.0:8080"
//! }
//! backend {
//!     url "redis://127.0.0.1:6379"
//!     max-idle 80
//!     max-active 12000
//! }
//! issuance {
//!     ttl-secs 600
//!     issue-delay-secs 10
//!     renewal-margin-secs 60
//!     identity-domain "certserver.fan"
//! }
//! ```
//!
//! Every field has a default, so an empty document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod backend;
pub mod issuance;
pub mod kdl;
pub mod server;
pub mod validate;

pub use backend::BackendConfig;
pub use issuance::IssuanceConfig;
pub use server::ServerConfig;
pub use validate::{
    ErrorCategory, ValidationError, ValidationOpts, ValidationResult, ValidationWarning,
};

/// Configuration errors surfaced to callers
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration:\n{0}")]
    Invalid(ValidationResult),
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub issuance: IssuanceConfig,
}

impl Config {
    /// Load configuration from a KDL file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let (config, unknown) = Self::from_file_with_unknown(path)?;
        for name in &unknown {
            warn!(node = %name, "Ignoring unknown configuration node");
        }
        Ok(config)
    }

    /// Load configuration from a KDL file, also returning the names of
    /// unknown nodes.
    pub fn from_file_with_unknown(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<String>), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        info!(path = %path.display(), "Loading configuration");

        Self::from_kdl_with_unknown(&text)
            .with_context(|| format!("in {}", path.display()))
            .map_err(|e| ConfigError::Parse(format!("{:#}", e)))
    }

    /// Parse configuration from KDL text.
    pub fn from_kdl(text: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = text
            .parse()
            .map_err(|e| anyhow::anyhow!("KDL syntax error: {}", e))?;

        let (config, unknown) = kdl::parse_document(&doc)?;
        for name in &unknown {
            warn!(node = %name, "Ignoring unknown configuration node");
        }

        debug!(
            listen = %config.server.listen,
            backend = %config.backend.url,
            ttl_secs = config.issuance.ttl_secs,
            "Parsed configuration"
        );

        Ok(config)
    }

    /// Parse configuration from KDL text, also returning the names of unknown
    /// top-level nodes so they can be reported as validation warnings.
    pub fn from_kdl_with_unknown(text: &str) -> Result<(Self, Vec<String>)> {
        let doc: ::kdl::KdlDocument = text
            .parse()
            .map_err(|e| anyhow::anyhow!("KDL syntax error: {}", e))?;
        kdl::parse_document(&doc)
    }

    /// Check every semantic rule, failing if any error was found.
    ///
    /// Warnings do not fail validation and are returned to the caller.
    pub fn validate(&self) -> Result<ValidationResult, ConfigError> {
        let result = validate::validate_config(self);
        if result.has_errors() {
            return Err(ConfigError::Invalid(result));
        }
        Ok(result)
    }

    /// Serialize the effective configuration as JSON, for `certsvc test`.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
