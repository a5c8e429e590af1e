use std::collections::HashSet;

use crate::app::picker::PickerHost;
use crate::domain::document::Document;
use crate::domain::model::NodeId;
use crate::infra::config::Picker as PickerConfig;

/// [`PickerHost`] over an in-memory [`Document`].
///
/// Highlighting toggles a reserved class on the nearest element; nodes inside a subtree marked
/// with the chrome attribute count as the tool's own UI. Only classes this host added are ever
/// removed, so a page that already uses the class name keeps it.
#[derive(Debug, Clone)]
pub struct DocumentHost {
    document: Document,
    highlight_class: String,
    chrome_marker: String,
    listener_sets: usize,
    cursor: Option<String>,
    applied: HashSet<NodeId>,
}

impl DocumentHost {
    pub fn new(document: Document, config: &PickerConfig) -> Self {
        Self {
            document,
            highlight_class: config.highlight_class.clone(),
            chrome_marker: config.chrome_marker.clone(),
            listener_sets: 0,
            cursor: None,
            applied: HashSet::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn listener_sets(&self) -> usize {
        self.listener_sets
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn highlight_class(&self) -> &str {
        &self.highlight_class
    }

    pub fn is_highlighted(&self, node: NodeId) -> bool {
        self.document
            .nearest_element(node)
            .is_some_and(|element| self.applied.contains(&element))
    }

    /// Elements this host has highlighted, in document order.
    pub fn highlighted(&self) -> Vec<NodeId> {
        self.document
            .descendants(self.document.root())
            .filter(|node| self.applied.contains(node))
            .collect()
    }
}

impl PickerHost for DocumentHost {
    fn attach_listeners(&mut self) {
        self.listener_sets += 1;
        tracing::trace!(listener_sets = self.listener_sets, "listeners attached");
    }

    fn detach_listeners(&mut self) {
        self.listener_sets = self.listener_sets.saturating_sub(1);
        tracing::trace!(listener_sets = self.listener_sets, "listeners detached");
    }

    fn set_cursor(&mut self, cursor: Option<&str>) {
        self.cursor = cursor.map(str::to_owned);
    }

    fn apply_highlight(&mut self, node: NodeId) {
        if let Some(element) = self.document.nearest_element(node)
            && self.document.add_class(element, &self.highlight_class)
        {
            self.applied.insert(element);
        }
    }

    fn clear_highlight(&mut self, node: NodeId) {
        if let Some(element) = self.document.nearest_element(node)
            && self.applied.remove(&element)
        {
            self.document.remove_class(element, &self.highlight_class);
        }
    }

    fn is_tool_chrome(&self, node: NodeId) -> bool {
        self.document
            .closest_with_attribute(node, &self.chrome_marker)
            .is_some()
    }
}
