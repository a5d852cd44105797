//! Certificate issuance policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use certsvc_common::{
    DEFAULT_IDENTITY_DOMAIN, DEFAULT_ISSUE_DELAY, DEFAULT_RENEWAL_MARGIN, DEFAULT_TTL,
};

/// Issuance policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceConfig {
    /// Validity window of every record
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Artificial delay applied after each create
    #[serde(default = "default_issue_delay_secs")]
    pub issue_delay_secs: u64,

    /// How long before expiry the identity record is renewed
    #[serde(default = "default_renewal_margin_secs")]
    pub renewal_margin_secs: u64,

    /// Domain the service issues for itself
    #[serde(default = "default_identity_domain")]
    pub identity_domain: String,
}

impl IssuanceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn issue_delay(&self) -> Duration {
        Duration::from_secs(self.issue_delay_secs)
    }

    /// Period of the identity renewal loop: TTL minus the renewal margin.
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.saturating_sub(self.renewal_margin_secs))
    }
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            issue_delay_secs: default_issue_delay_secs(),
            renewal_margin_secs: default_renewal_margin_secs(),
            identity_domain: default_identity_domain(),
        }
    }
}

pub fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

pub fn default_issue_delay_secs() -> u64 {
    DEFAULT_ISSUE_DELAY.as_secs()
}

pub fn default_renewal_margin_secs() -> u64 {
    DEFAULT_RENEWAL_MARGIN.as_secs()
}

pub fn default_identity_domain() -> String {
    DEFAULT_IDENTITY_DOMAIN.to_string()
}
