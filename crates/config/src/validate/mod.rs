//! Configuration validation
//!
//! Semantic checks run on every load. Linting adds warnings for settings that
//! are legal but unusual. The network probe is opt-in because it needs the
//! backend to be running.

use std::fmt;
use std::net::SocketAddr;

use certsvc_common::is_valid_domain;

use crate::Config;

pub mod lint;
pub mod network;

pub use lint::lint_config;
pub use network::validate_backend_reachable;

/// Which optional validation passes to run
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOpts {
    /// Probe the backend host over TCP
    pub network: bool,
}

/// Category of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Server,
    Backend,
    Issuance,
    Network,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Server => "server",
            ErrorCategory::Backend => "backend",
            ErrorCategory::Issuance => "issuance",
            ErrorCategory::Network => "network",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Accumulated errors and warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Append another result's findings
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "  error: {}", error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        Ok(())
    }
}

/// Run the semantic checks and lints.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.server.listen.parse::<SocketAddr>().is_err() {
        result.add_error(ValidationError::new(
            ErrorCategory::Server,
            format!(
                "listen address '{}' is not a socket address (expected host:port)",
                config.server.listen
            ),
        ));
    }

    let backend = &config.backend;
    if !(backend.url.starts_with("redis://") || backend.url.starts_with("memory://")) {
        result.add_error(ValidationError::new(
            ErrorCategory::Backend,
            format!(
                "backend url '{}' must use the redis:// or memory:// scheme",
                backend.url
            ),
        ));
    }
    if backend.max_active == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Backend,
            "max-active must be at least 1",
        ));
    } else if backend.max_idle > backend.max_active {
        result.add_warning(ValidationWarning::new(format!(
            "max-idle ({}) exceeds max-active ({}); idle connections will be capped at {}",
            backend.max_idle, backend.max_active, backend.max_active
        )));
    }
    if backend.acquire_timeout_ms == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Backend,
            "acquire-timeout-ms must be greater than 0",
        ));
    }

    let issuance = &config.issuance;
    if issuance.ttl_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Issuance,
            "ttl-secs must be greater than 0",
        ));
    }
    if issuance.renewal_margin_secs == 0 || issuance.renewal_margin_secs >= issuance.ttl_secs {
        result.add_error(ValidationError::new(
            ErrorCategory::Issuance,
            format!(
                "renewal-margin-secs ({}) must be greater than 0 and less than ttl-secs ({})",
                issuance.renewal_margin_secs, issuance.ttl_secs
            ),
        ));
    }
    if !is_valid_domain(&issuance.identity_domain) {
        result.add_error(ValidationError::new(
            ErrorCategory::Issuance,
            format!(
                "identity-domain '{}' is not a valid domain name",
                issuance.identity_domain
            ),
        ));
    }

    result.merge(lint_config(config));
    result
}

/// Run every requested pass, including the network probe when enabled.
pub async fn validate(config: &Config, opts: ValidationOpts) -> ValidationResult {
    let mut result = validate_config(config);
    if opts.network {
        result.merge(validate_backend_reachable(config).await);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(result: &ValidationResult) -> Vec<String> {
        result.errors.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&Config::default());
        assert!(!result.has_errors(), "{}", result);
    }

    #[test]
    fn test_bad_listen_address() {
        let mut config = Config::default();
        config.server.listen = "localhost".to_string();

        let result = validate_config(&config);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].category, ErrorCategory::Server);
    }

    #[test]
    fn test_bad_backend_scheme() {
        let mut config = Config::default();
        config.backend.url = "postgres://db".to_string();

        let result = validate_config(&config);
        assert!(messages(&result).iter().any(|m| m.contains("scheme")));
    }

    #[test]
    fn test_max_idle_over_max_active_is_warning() {
        let mut config = Config::default();
        config.backend.max_idle = 10;
        config.backend.max_active = 5;

        let result = validate_config(&config);
        assert!(!result.has_errors());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("exceeds max-active")));
    }

    #[test]
    fn test_margin_must_be_inside_ttl() {
        let mut config = Config::default();
        config.issuance.renewal_margin_secs = config.issuance.ttl_secs;
        assert!(validate_config(&config).has_errors());

        config.issuance.renewal_margin_secs = 0;
        assert!(validate_config(&config).has_errors());

        config.issuance.renewal_margin_secs = 1;
        assert!(!validate_config(&config).has_errors());
    }

    #[test]
    fn test_identity_domain_checked() {
        let mut config = Config::default();
        config.issuance.identity_domain = "Fanatics.co.uk".to_string();

        let result = validate_config(&config);
        assert!(messages(&result)
            .iter()
            .any(|m| m.contains("identity-domain")));
    }

    #[test]
    fn test_display_lists_everything() {
        let mut result = ValidationResult::new();
        result.add_error(ValidationError::new(ErrorCategory::Backend, "broken"));
        result.add_warning(ValidationWarning::new("odd"));

        let text = result.to_string();
        assert!(text.contains("error: [backend] broken"));
        assert!(text.contains("warning: odd"));
    }

    #[tokio::test]
    async fn test_validate_without_network_skips_probe() {
        let mut config = Config::default();
        config.backend.url = "redis://192.0.2.1:6379".to_string();

        let result = validate(&config, ValidationOpts::default()).await;
        assert!(!result.has_errors());
    }
}
