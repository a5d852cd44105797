//! KDL configuration parsing.

use anyhow::{Context, Result};
use tracing::trace;

use crate::Config;

mod backend;
mod helpers;
mod issuance;
mod server;

pub use backend::parse_backend_config;
pub use issuance::parse_issuance_config;
pub use server::parse_server_config;

/// Parse a KDL document into a [`Config`].
///
/// Returns the configuration and the names of any nodes that were not
/// recognized, at the top level or inside a known block.
pub fn parse_document(doc: &kdl::KdlDocument) -> Result<(Config, Vec<String>)> {
    let mut config = Config::default();
    let mut unknown = Vec::new();

    for node in doc.nodes() {
        let name = node.name().value();
        trace!(node = %name, "Parsing top-level node");

        match name {
            "server" => {
                config.server = parse_server_config(node).context("in 'server' block")?;
                unknown.extend(helpers::unknown_children(node, server::KNOWN));
            }
            "backend" => {
                config.backend = parse_backend_config(node).context("in 'backend' block")?;
                unknown.extend(helpers::unknown_children(node, backend::KNOWN));
            }
            "issuance" => {
                config.issuance =
                    parse_issuance_config(node).context("in 'issuance' block")?;
                unknown.extend(helpers::unknown_children(node, issuance::KNOWN));
            }
            other => unknown.push(other.to_string()),
        }
    }

    Ok((config, unknown))
}
