//! Backend KDL parsing.

use anyhow::Result;
use tracing::trace;

use crate::backend::*;

use super::helpers::{get_string_entry, get_u64_entry, get_usize_entry};

pub(super) const KNOWN: &[&str] = &[
    "url",
    "max-idle",
    "max-active",
    "acquire-timeout-ms",
    "connect-timeout-ms",
    "idle-timeout-secs",
];

/// Parse backend configuration block
pub fn parse_backend_config(node: &kdl::KdlNode) -> Result<BackendConfig> {
    trace!("Parsing backend configuration block");

    let config = BackendConfig {
        url: get_string_entry(node, "url")?.unwrap_or_else(default_url),
        max_idle: get_usize_entry(node, "max-idle")?.unwrap_or_else(default_max_idle),
        max_active: get_usize_entry(node, "max-active")?.unwrap_or_else(default_max_active),
        acquire_timeout_ms: get_u64_entry(node, "acquire-timeout-ms")?
            .unwrap_or_else(default_acquire_timeout_ms),
        connect_timeout_ms: get_u64_entry(node, "connect-timeout-ms")?
            .unwrap_or_else(default_connect_timeout_ms),
        idle_timeout_secs: get_u64_entry(node, "idle-timeout-secs")?
            .unwrap_or_else(default_idle_timeout_secs),
    };

    trace!(
        url = %config.url,
        max_idle = config.max_idle,
        max_active = config.max_active,
        "Parsed backend configuration"
    );

    Ok(config)
}
