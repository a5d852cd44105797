//! Entry lookup helpers shared by the block parsers.
//!
//! A setting may be written either as a child node (`listen "0.0.0.0:8080"`)
//! or as a property on the block itself (`server listen="0.0.0.0:8080"`).
//! Child nodes take precedence.

use anyhow::{anyhow, Result};
use kdl::{KdlNode, KdlValue};

/// Find the value of a setting in a block
fn find_value<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    if let Some(children) = node.children() {
        if let Some(child) = children.nodes().iter().find(|n| n.name().value() == name) {
            return first_arg(child);
        }
    }

    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(name))
        .map(|e| e.value())
}

/// First positional argument of a node
fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

/// Get a string setting, failing if it is present with another type
pub fn get_string_entry(node: &KdlNode, name: &str) -> Result<Option<String>> {
    match find_value(node, name) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| {
                anyhow!(
                    "'{}.{}' must be a string, got {}",
                    node.name().value(),
                    name,
                    value
                )
            }),
    }
}

/// Get an integer setting, failing if it is present with another type
pub fn get_int_entry(node: &KdlNode, name: &str) -> Result<Option<i128>> {
    match find_value(node, name) {
        None => Ok(None),
        Some(value) => value.as_integer().map(Some).ok_or_else(|| {
            anyhow!(
                "'{}.{}' must be an integer, got {}",
                node.name().value(),
                name,
                value
            )
        }),
    }
}

/// Get a non-negative integer setting
pub fn get_u64_entry(node: &KdlNode, name: &str) -> Result<Option<u64>> {
    match get_int_entry(node, name)? {
        None => Ok(None),
        Some(v) => u64::try_from(v).map(Some).map_err(|_| {
            anyhow!(
                "'{}.{}' must be a non-negative integer, got {}",
                node.name().value(),
                name,
                v
            )
        }),
    }
}

/// Get a non-negative integer setting sized for counts
pub fn get_usize_entry(node: &KdlNode, name: &str) -> Result<Option<usize>> {
    match get_u64_entry(node, name)? {
        None => Ok(None),
        Some(v) => usize::try_from(v).map(Some).map_err(|_| {
            anyhow!("'{}.{}' is too large: {}", node.name().value(), name, v)
        }),
    }
}

/// Names of child nodes in a block that are not in `known`
pub fn unknown_children(node: &KdlNode, known: &[&str]) -> Vec<String> {
    node.children()
        .map(|children| {
            children
                .nodes()
                .iter()
                .map(|n| n.name().value())
                .filter(|name| !known.contains(name))
                .map(|name| format!("{}.{}", node.name().value(), name))
                .collect()
        })
        .unwrap_or_default()
}
