//! Loading host documents from DevTools-style DOM snapshots.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::document::Document;
use crate::domain::errors::DomainError;
use crate::domain::model::NodeId;

const ELEMENT_NODE: u8 = 1;
const TEXT_NODE: u8 = 3;
const CDATA_SECTION_NODE: u8 = 4;
const COMMENT_NODE: u8 = 8;
const DOCUMENT_NODE: u8 = 9;
const DOCUMENT_TYPE_NODE: u8 = 10;
const DOCUMENT_FRAGMENT_NODE: u8 = 11;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot root must be a document, fragment or element node (got nodeType {0})")]
    UnsupportedRoot(u8),
    #[error("element node without a nodeName")]
    MissingName,
    #[error("attributes of <{0}> must come in name/value pairs")]
    OddAttributes(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A node as reported by `DOM.getDocument` with `depth: -1`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    /// Zero when absent, which no root accepts.
    #[serde(default)]
    pub node_type: u8,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub node_value: String,
    /// Flat `[name, value, name, value, ...]` list.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
    #[serde(default, rename = "documentURL")]
    pub document_url: Option<String>,
    /// Present on the `{ "root": node }` envelope that `DOM.getDocument` returns.
    #[serde(default)]
    pub root: Option<Box<SnapshotNode>>,
}

/// Read a snapshot from `path`, or from stdin when `path` is `-`.
pub fn load(path: &Path) -> Result<Document> {
    let data = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read snapshot from stdin")?;
        buffer
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot file {}", path.display()))?
    };

    let document = parse(&data)
        .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        nodes = document.len(),
        url = document.url().unwrap_or("-"),
        "snapshot loaded"
    );
    Ok(document)
}

/// Parse snapshot JSON, accepting either `{ "root": node }` or a bare node.
///
/// Nesting depth is unbounded; the stack grows on demand while deserializing.
pub fn parse(data: &str) -> Result<Document, SnapshotError> {
    let mut deserializer = serde_json::Deserializer::from_str(data);
    deserializer.disable_recursion_limit();
    let mut node =
        SnapshotNode::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;

    let root = match node.root.take() {
        Some(root) => *root,
        None => node,
    };
    build_document(root)
}

/// Convert a deserialized snapshot tree into a [`Document`].
pub fn build_document(root: SnapshotNode) -> Result<Document, SnapshotError> {
    let mut document = Document::new();
    if let Some(url) = root.document_url.clone() {
        document.set_url(url);
    }

    let doc_root = document.root();
    let top_level = match root.node_type {
        DOCUMENT_NODE | DOCUMENT_FRAGMENT_NODE => root.children,
        ELEMENT_NODE => vec![root],
        other => return Err(SnapshotError::UnsupportedRoot(other)),
    };

    let mut pending: Vec<(NodeId, SnapshotNode)> = top_level
        .into_iter()
        .rev()
        .map(|node| (doc_root, node))
        .collect();

    while let Some((parent, node)) = pending.pop() {
        let SnapshotNode {
            node_type,
            node_name,
            node_value,
            attributes,
            children,
            ..
        } = node;

        let id = match node_type {
            ELEMENT_NODE => {
                if node_name.trim().is_empty() {
                    return Err(SnapshotError::MissingName);
                }
                let id = document.create_element(&node_name);
                if attributes.len() % 2 != 0 {
                    return Err(SnapshotError::OddAttributes(node_name.to_ascii_lowercase()));
                }
                for pair in attributes.chunks(2) {
                    document.set_attribute(id, &pair[0], pair[1].clone())?;
                }
                id
            }
            TEXT_NODE | CDATA_SECTION_NODE => document.create_text(node_value),
            COMMENT_NODE => document.create_comment(node_value),
            DOCUMENT_FRAGMENT_NODE => {
                pending.extend(children.into_iter().rev().map(|child| (parent, child)));
                continue;
            }
            DOCUMENT_TYPE_NODE => continue,
            other => {
                tracing::debug!(node_type = other, "skipping unsupported snapshot node");
                continue;
            }
        };

        document.append_child(parent, id)?;
        pending.extend(children.into_iter().rev().map(|child| (id, child)));
    }

    Ok(document)
}
