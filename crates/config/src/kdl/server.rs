//! Server KDL parsing.

use anyhow::Result;
use tracing::trace;

use crate::server::*;

use super::helpers::get_string_entry;

pub(super) const KNOWN: &[&str] = &["listen"];

/// Parse server configuration block
pub fn parse_server_config(node: &kdl::KdlNode) -> Result<ServerConfig> {
    trace!("Parsing server configuration block");

    let config = ServerConfig {
        listen: get_string_entry(node, "listen")?.unwrap_or_else(default_listen),
    };

    trace!(listen = %config.listen, "Parsed server configuration");

    Ok(config)
}
