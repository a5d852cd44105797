//! Configuration linting
//!
//! Flags settings that are legal but unusual for a production deployment.

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// Renewal margins below this leave little room for a slow backend
const TIGHT_MARGIN_SECS: u64 = 5;

/// Lint configuration for production readiness
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.backend.is_memory() {
        result.add_warning(ValidationWarning::new(
            "Backend is memory://; records are lost on restart and not shared between instances",
        ));
    }

    if config.issuance.issue_delay_secs == 0 {
        result.add_warning(ValidationWarning::new(
            "issue-delay-secs is 0; certificate creation is not throttled",
        ));
    }

    let margin = config.issuance.renewal_margin_secs;
    if margin > 0 && margin < TIGHT_MARGIN_SECS && margin < config.issuance.ttl_secs {
        result.add_warning(ValidationWarning::new(format!(
            "renewal-margin-secs is {}; the identity record may expire if a renewal is slow",
            margin
        )));
    }

    if config.backend.max_idle == 0 {
        result.add_warning(ValidationWarning::new(
            "max-idle is 0; every operation dials a new backend connection",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_default_is_clean() {
        let result = lint_config(&Config::default());
        assert!(result.warnings.is_empty(), "{}", result);
    }

    #[test]
    fn test_lint_memory_backend() {
        let mut config = Config::default();
        config.backend.url = "memory://".to_string();

        let result = lint_config(&config);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("memory://")));
    }

    #[test]
    fn test_lint_zero_delay() {
        let mut config = Config::default();
        config.issuance.issue_delay_secs = 0;

        let result = lint_config(&config);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("not throttled")));
    }

    #[test]
    fn test_lint_tight_margin() {
        let mut config = Config::default();
        config.issuance.renewal_margin_secs = 2;

        let result = lint_config(&config);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("may expire")));
    }
}
