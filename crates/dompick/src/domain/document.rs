//! Arena-backed element tree standing in for the host page.

use crate::domain::errors::DomainError;
use crate::domain::model::{Attribute, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Payload carried by a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Element tree of one page. Node `0` is always the document node.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    url: Option<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            url: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::from_index(0)
    }

    /// Address of the page the tree was captured from, when known.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    /// Number of nodes in the arena, including the document node.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    /// Create a detached element. Tag names are stored lower-cased.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.trim().to_ascii_lowercase(),
            attributes: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Comment(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Attach a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomainError> {
        let parent_node = self.node(parent)?;
        if !matches!(parent_node.data, NodeData::Document | NodeData::Element(_)) {
            return Err(DomainError::NotAContainer(parent));
        }
        let child_node = self.node(child)?;
        if child_node.parent.is_some() || child == self.root() {
            return Err(DomainError::AlreadyAttached { child });
        }
        if parent == child || self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(DomainError::HierarchyCycle { parent, child });
        }

        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
        Ok(())
    }

    /// Set or replace an attribute on an element.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), DomainError> {
        let element = self.element_mut(node)?;
        let name = name.trim().to_ascii_lowercase();
        let value = value.into();
        match element.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => existing.value = value,
            None => element.attributes.push(Attribute { name, value }),
        }
        Ok(())
    }

    /// Remove an attribute, returning whether it was present.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        match self.element_mut(node) {
            Ok(element) => {
                let before = element.attributes.len();
                element.attributes.retain(|attr| attr.name != name);
                element.attributes.len() != before
            }
            Err(_) => false,
        }
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.index()).map(|node| &node.data)
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.data(node)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    /// Lower-cased tag name of an element.
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag.as_str())
    }

    pub fn attributes(&self, node: NodeId) -> &[Attribute] {
        self.element(node)
            .map(|element| element.attributes.as_slice())
            .unwrap_or(&[])
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// The element's id when present and not blank, trimmed.
    pub fn element_id(&self, node: NodeId) -> Option<&str> {
        self.attribute(node, "id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Whitespace-separated tokens of the `class` attribute, in source order.
    pub fn class_list(&self, node: NodeId) -> Vec<&str> {
        self.attribute(node, "class")
            .map(|value| value.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Add a class token. Returns `false` when the token was already present or the node is not an
    /// element.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> bool {
        if !self.is_element(node) || self.class_list(node).contains(&class) {
            return false;
        }
        let mut classes: Vec<String> = self
            .class_list(node)
            .into_iter()
            .map(str::to_owned)
            .collect();
        classes.push(class.to_owned());
        self.set_attribute(node, "class", classes.join(" ")).is_ok()
    }

    /// Remove a class token, dropping the attribute once it is empty.
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> bool {
        let classes = self.class_list(node);
        if !classes.contains(&class) {
            return false;
        }
        let remaining: Vec<String> = classes
            .into_iter()
            .filter(|token| *token != class)
            .map(str::to_owned)
            .collect();
        if remaining.is_empty() {
            self.remove_attribute(node, "class")
        } else {
            self.set_attribute(node, "class", remaining.join(" ")).is_ok()
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.index()).and_then(|node| node.parent)
    }

    /// Parent node when it is an element (the document node does not count).
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.index())
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    /// Parent chain of `node`, nearest first, up to and including the document node.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), |current| self.parent(*current))
    }

    /// Pre-order traversal of the subtree below `node`, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(node).to_vec();
        stack.reverse();
        Descendants {
            document: self,
            stack,
        }
    }

    /// `node` itself when it is an element, otherwise its parent element.
    pub fn nearest_element(&self, node: NodeId) -> Option<NodeId> {
        if self.is_element(node) {
            Some(node)
        } else {
            self.parent_element(node)
        }
    }

    /// Closest element, starting at `node`, that carries attribute `name`.
    pub fn closest_with_attribute(&self, node: NodeId, name: &str) -> Option<NodeId> {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find(|candidate| self.has_attribute(*candidate, name))
    }

    /// First element in document order whose id equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|node| self.element_id(*node) == Some(id))
    }

    /// Concatenated text of every text node below `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        if let Some(NodeData::Text(text)) = self.data(node) {
            return text.clone();
        }
        self.descendants(node)
            .filter_map(|child| match self.data(child) {
                Some(NodeData::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Serialize the node and its subtree as HTML markup.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, false, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, raw_text: bool, out: &mut String) {
        match self.data(node) {
            None => {}
            Some(NodeData::Document) => {
                for child in self.children(node) {
                    self.write_html(*child, false, out);
                }
            }
            Some(NodeData::Text(text)) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    escape_text(text, out);
                }
            }
            Some(NodeData::Comment(text)) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Some(NodeData::Element(element)) => {
                out.push('<');
                out.push_str(&element.tag);
                for attr in &element.attributes {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    escape_attribute(&attr.value, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                for child in self.children(node) {
                    self.write_html(*child, raw, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomainError> {
        self.nodes
            .get(id.index())
            .ok_or(DomainError::UnknownNode(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomainError> {
        match self.nodes.get_mut(id.index()) {
            Some(Node {
                data: NodeData::Element(element),
                ..
            }) => Ok(element),
            Some(_) => Err(DomainError::NotAnElement(id)),
            None => Err(DomainError::UnknownNode(id)),
        }
    }
}

/// Iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.document.children(next).iter().rev().copied());
        Some(next)
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let html = doc.create_element("HTML");
        doc.append_child(doc.root(), html).unwrap();
        let body = doc.create_element("body");
        doc.append_child(html, body).unwrap();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "a b").unwrap();
        doc.append_child(body, div).unwrap();
        let text = doc.create_text("hello & bye");
        doc.append_child(div, text).unwrap();
        (doc, body, div)
    }

    #[test]
    fn tags_are_lower_cased() {
        let (doc, _, _) = sample();
        let html = doc.children(doc.root())[0];
        assert_eq!(doc.tag_name(html), Some("html"));
    }

    #[test]
    fn append_rejects_cycles_and_reattachment() {
        let (mut doc, body, div) = sample();
        assert_eq!(
            doc.append_child(div, body),
            Err(DomainError::AlreadyAttached { child: body })
        );

        let detached = doc.create_element("section");
        let inner = doc.create_element("p");
        doc.append_child(detached, inner).unwrap();
        assert_eq!(
            doc.append_child(inner, detached),
            Err(DomainError::HierarchyCycle {
                parent: inner,
                child: detached
            })
        );
    }

    #[test]
    fn text_nodes_cannot_have_children() {
        let (mut doc, _, div) = sample();
        let text = doc.children(div)[0];
        let span = doc.create_element("span");
        assert_eq!(
            doc.append_child(text, span),
            Err(DomainError::NotAContainer(text))
        );
    }

    #[test]
    fn class_tokens_round_trip_through_add_and_remove() {
        let (mut doc, _, div) = sample();
        assert!(doc.add_class(div, "picked"));
        assert!(!doc.add_class(div, "picked"));
        assert_eq!(doc.class_list(div), vec!["a", "b", "picked"]);
        assert!(doc.remove_class(div, "picked"));
        assert_eq!(doc.attribute(div, "class"), Some("a b"));
    }

    #[test]
    fn removing_last_class_drops_attribute() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        doc.add_class(span, "only");
        assert!(doc.remove_class(span, "only"));
        assert!(!doc.has_attribute(span, "class"));
    }

    #[test]
    fn blank_ids_are_ignored() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "id", "   ").unwrap();
        assert_eq!(doc.element_id(div), None);
    }

    #[test]
    fn outer_html_escapes_text_and_attributes() {
        let (mut doc, _, div) = sample();
        doc.set_attribute(div, "title", "say \"hi\"").unwrap();
        let img = doc.create_element("img");
        doc.set_attribute(img, "src", "a.png").unwrap();
        doc.append_child(div, img).unwrap();
        assert_eq!(
            doc.outer_html(div),
            "<div class=\"a b\" title=\"say &quot;hi&quot;\">hello &amp; bye<img src=\"a.png\"></div>"
        );
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let (doc, body, div) = sample();
        let order: Vec<NodeId> = doc.descendants(body).collect();
        assert_eq!(order, vec![div, doc.children(div)[0]]);
    }

    #[test]
    fn closest_with_attribute_checks_self_first() {
        let (mut doc, body, div) = sample();
        doc.set_attribute(body, "data-dompick", "true").unwrap();
        assert_eq!(doc.closest_with_attribute(div, "data-dompick"), Some(body));
        assert_eq!(doc.closest_with_attribute(body, "data-dompick"), Some(body));
    }
}
