//! Canonical selector paths for picked elements.
//!
//! A path is built from the picked element upward. Each step contributes the lower-cased tag
//! name, disambiguated with `:nth-of-type(n)` when the parent holds more than one element with
//! that tag. The first element carrying an id ends the ascent with a `#id` segment; ids are
//! assumed to be unique in the document, which pages with duplicate ids violate.

use crate::domain::document::Document;
use crate::domain::model::{NodeId, SelectorPath};

const ID_SPECIAL_CHARS: &[char] = &[':', '.', '[', ']', ',', '='];

/// Canonical `" > "`-joined selector for `node`, or an empty string for non-element input.
pub fn css_path(document: &Document, node: NodeId) -> String {
    selector_path(document, node)
        .map(|path| path.to_string())
        .unwrap_or_default()
}

/// Segment-wise form of [`css_path`]. `None` when `node` is not an element.
pub fn selector_path(document: &Document, node: NodeId) -> Option<SelectorPath> {
    if !document.is_element(node) {
        return None;
    }

    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(element) = current {
        let Some(tag) = document.tag_name(element) else {
            break;
        };

        if let Some(id) = document.element_id(element) {
            segments.push(format!("#{}", escape_id(id)));
            break;
        }

        let mut segment = tag.to_owned();
        if let Some(parent) = document.parent(element) {
            let mut same_tag = 0usize;
            let mut position = 0usize;
            for sibling in document.element_children(parent) {
                if document.tag_name(sibling) == Some(tag) {
                    same_tag += 1;
                    if sibling == element {
                        position = same_tag;
                    }
                }
            }
            if same_tag > 1 {
                segment.push_str(&format!(":nth-of-type({position})"));
            }
        }
        segments.push(segment);

        current = document.parent_element(element);
    }

    segments.reverse();
    Some(SelectorPath::new(segments))
}

/// Backslash-escape the characters that would otherwise end an id selector early.
pub fn escape_id(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for ch in id.chars() {
        if ID_SPECIAL_CHARS.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Inverse of [`escape_id`].
pub fn unescape_id(escaped: &str) -> String {
    let mut id = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(next) = chars.peek()
            && ID_SPECIAL_CHARS.contains(next)
        {
            continue;
        }
        id.push(ch);
    }
    id
}

/// Resolve a path produced by [`css_path`] back to a node of `document`.
///
/// Only the grammar emitted by [`css_path`] is understood: a leading `#id` segment (looked up
/// document-wide), followed by `tag` or `tag:nth-of-type(n)` child steps.
pub fn resolve_path(document: &Document, path: &str) -> Option<NodeId> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut segments = path.split(SelectorPath::SEPARATOR).map(str::trim);
    let first = segments.next()?;
    let mut current = match first.strip_prefix('#') {
        Some(escaped) => document.element_by_id(&unescape_id(escaped))?,
        None => child_for_segment(document, document.root(), first)?,
    };

    for segment in segments {
        current = child_for_segment(document, current, segment)?;
    }
    Some(current)
}

fn child_for_segment(document: &Document, parent: NodeId, segment: &str) -> Option<NodeId> {
    let (tag, nth) = parse_segment(segment)?;
    let mut matching = document
        .element_children(parent)
        .filter(|child| document.tag_name(*child) == Some(tag.as_str()));

    match nth {
        Some(index) => matching.nth(index.checked_sub(1)?),
        None => {
            let first = matching.next()?;
            // An undecorated segment only identifies a child when it is the sole one of its tag.
            if matching.next().is_some() {
                None
            } else {
                Some(first)
            }
        }
    }
}

fn parse_segment(segment: &str) -> Option<(String, Option<usize>)> {
    match segment.split_once(":nth-of-type(") {
        Some((tag, rest)) => {
            let index = rest.strip_suffix(')')?.trim().parse().ok()?;
            Some((tag.to_ascii_lowercase(), Some(index)))
        }
        None if !segment.is_empty() => Some((segment.to_ascii_lowercase(), None)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Page {
        doc: Document,
        body: NodeId,
    }

    fn page() -> Page {
        let mut doc = Document::new();
        let html = doc.create_element("html");
        doc.append_child(doc.root(), html).unwrap();
        let body = doc.create_element("body");
        doc.append_child(html, body).unwrap();
        Page { doc, body }
    }

    fn child(doc: &mut Document, parent: NodeId, tag: &str) -> NodeId {
        let node = doc.create_element(tag);
        doc.append_child(parent, node).unwrap();
        node
    }

    #[test]
    fn id_short_circuits_regardless_of_depth() {
        let Page { mut doc, body } = page();
        let outer = child(&mut doc, body, "section");
        let div = child(&mut doc, outer, "div");
        doc.set_attribute(div, "id", "x").unwrap();
        doc.set_attribute(div, "class", "a b").unwrap();

        assert_eq!(css_path(&doc, div), "#x");
    }

    #[test]
    fn id_special_characters_are_escaped() {
        let Page { mut doc, body } = page();
        let div = child(&mut doc, body, "div");
        doc.set_attribute(div, "id", "a:b.c[d],e=f").unwrap();

        assert_eq!(css_path(&doc, div), r"#a\:b\.c\[d\]\,e\=f");
        assert_eq!(resolve_path(&doc, &css_path(&doc, div)), Some(div));
    }

    #[test]
    fn nth_of_type_marks_repeated_siblings() {
        let Page { mut doc, body } = page();
        let list = child(&mut doc, body, "ul");
        let first = child(&mut doc, list, "li");
        let second = child(&mut doc, list, "li");
        child(&mut doc, list, "li");

        assert_eq!(css_path(&doc, second), "html > body > ul > li:nth-of-type(2)");
        assert_eq!(css_path(&doc, first), "html > body > ul > li:nth-of-type(1)");
    }

    #[test]
    fn unrelated_siblings_do_not_trigger_nth_of_type() {
        let Page { mut doc, body } = page();
        child(&mut doc, body, "header");
        let main = child(&mut doc, body, "main");
        child(&mut doc, body, "footer");

        assert_eq!(css_path(&doc, main), "html > body > main");
    }

    #[test]
    fn segment_count_matches_depth_and_path_resolves() {
        let Page { mut doc, body } = page();
        let wrapper = child(&mut doc, body, "div");
        child(&mut doc, body, "div");
        let list = child(&mut doc, wrapper, "ul");
        child(&mut doc, list, "li");
        let target = child(&mut doc, list, "li");

        let path = selector_path(&doc, target).unwrap();
        let depth = doc.ancestors(target).count();
        assert_eq!(path.len(), depth);
        assert!(!path.is_anchored());
        assert_eq!(resolve_path(&doc, &path.to_string()), Some(target));
    }

    #[test]
    fn ancestor_id_anchors_the_path() {
        let Page { mut doc, body } = page();
        let main = child(&mut doc, body, "main");
        doc.set_attribute(main, "id", "content").unwrap();
        let p = child(&mut doc, main, "p");
        child(&mut doc, main, "p");

        assert_eq!(css_path(&doc, p), "#content > p:nth-of-type(1)");
        assert_eq!(resolve_path(&doc, "#content > p:nth-of-type(1)"), Some(p));
    }

    #[test]
    fn detached_node_yields_single_segment() {
        let mut doc = Document::new();
        let orphan = doc.create_element("aside");
        assert_eq!(css_path(&doc, orphan), "aside");
    }

    #[test]
    fn non_elements_yield_empty_path() {
        let Page { mut doc, body } = page();
        let text = doc.create_text("hi");
        doc.append_child(body, text).unwrap();

        assert_eq!(css_path(&doc, text), "");
        assert_eq!(css_path(&doc, doc.root()), "");
        assert_eq!(css_path(&doc, NodeId::from_index(999)), "");
    }

    #[test]
    fn resolve_rejects_ambiguous_or_unknown_segments() {
        let Page { mut doc, body } = page();
        child(&mut doc, body, "p");
        child(&mut doc, body, "p");

        assert_eq!(resolve_path(&doc, "html > body > p"), None);
        assert_eq!(resolve_path(&doc, "html > body > p:nth-of-type(3)"), None);
        assert_eq!(resolve_path(&doc, "html > body > p:nth-of-type(0)"), None);
        assert_eq!(resolve_path(&doc, "#missing"), None);
        assert_eq!(resolve_path(&doc, ""), None);
    }
}
