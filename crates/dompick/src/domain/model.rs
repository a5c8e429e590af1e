//! Domain models for picked elements, selector paths, and filter candidates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node inside a [`Document`](crate::domain::document::Document) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Ordered `tag`, `tag:nth-of-type(n)` or terminal `#id` segments, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorPath {
    segments: Vec<String>,
}

impl SelectorPath {
    pub const SEPARATOR: &'static str = " > ";

    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether ascent stopped at an id-carrying element.
    pub fn is_anchored(&self) -> bool {
        self.segments
            .first()
            .map(|segment| segment.starts_with('#'))
            .unwrap_or(false)
    }
}

impl fmt::Display for SelectorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(Self::SEPARATOR))
    }
}

/// A candidate cosmetic filter together with the reason it was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCandidate {
    pub description: String,
    pub rule: String,
}

impl FilterCandidate {
    pub fn new(description: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            rule: rule.into(),
        }
    }
}
