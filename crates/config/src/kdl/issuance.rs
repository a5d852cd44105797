//! Issuance policy KDL parsing.

use anyhow::Result;
use tracing::trace;

use crate::issuance::*;

use super::helpers::{get_string_entry, get_u64_entry};

pub(super) const KNOWN: &[&str] = &[
    "ttl-secs",
    "issue-delay-secs",
    "renewal-margin-secs",
    "identity-domain",
];

/// Parse issuance configuration block
pub fn parse_issuance_config(node: &kdl::KdlNode) -> Result<IssuanceConfig> {
    trace!("Parsing issuance configuration block");

    let config = IssuanceConfig {
        ttl_secs: get_u64_entry(node, "ttl-secs")?.unwrap_or_else(default_ttl_secs),
        issue_delay_secs: get_u64_entry(node, "issue-delay-secs")?
            .unwrap_or_else(default_issue_delay_secs),
        renewal_margin_secs: get_u64_entry(node, "renewal-margin-secs")?
            .unwrap_or_else(default_renewal_margin_secs),
        identity_domain: get_string_entry(node, "identity-domain")?
            .unwrap_or_else(default_identity_domain),
    };

    trace!(
        ttl_secs = config.ttl_secs,
        issue_delay_secs = config.issue_delay_secs,
        identity_domain = %config.identity_domain,
        "Parsed issuance configuration"
    );

    Ok(config)
}
