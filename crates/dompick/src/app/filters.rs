//! Cosmetic filter synthesis for picked elements.
//!
//! Candidates are generated from the most to the least robust anchor: id, classes, stable
//! attributes, direct text, parent scoping, and identifying descendants. A structural fallback
//! built from the canonical selector path is only used when nothing else applies.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::app::selector;
use crate::domain::document::{Document, NodeData};
use crate::domain::model::{FilterCandidate, NodeId};
use crate::infra::config::{Config, Filters};

static HASHED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid hashed-token pattern"));

/// Description of the placeholder rule returned for input outside any element.
pub const NO_ELEMENT_DESCRIPTION: &str = "Invalid input (no element to match)";

/// Parents that are too generic to scope a rule.
const UNSCOPED_PARENTS: &[&str] = &["body", "html"];

/// Tunables for [`FilterSynthesizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    pub attributes: Vec<String>,
    pub noise_prefixes: Vec<String>,
    pub noise_min_length: usize,
    pub text_limit: usize,
    /// Class applied by the picker highlight; never part of a rule.
    pub highlight_class: String,
}

impl FilterOptions {
    pub fn from_config(config: &Config) -> Self {
        let Filters {
            attributes,
            noise_prefixes,
            noise_min_length,
            text_limit,
        } = config.filters.clone();
        Self {
            attributes,
            noise_prefixes,
            noise_min_length,
            text_limit,
            highlight_class: config.picker.highlight_class.clone(),
        }
    }
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Produces ranked, deduplicated cosmetic filter candidates.
#[derive(Debug, Clone, Default)]
pub struct FilterSynthesizer {
    options: FilterOptions,
}

impl FilterSynthesizer {
    pub fn new(options: FilterOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(FilterOptions::from_config(config))
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Generate candidates for `node` scoped to `domain`. Never returns an empty list.
    pub fn synthesize(
        &self,
        document: &Document,
        node: NodeId,
        domain: &str,
    ) -> Vec<FilterCandidate> {
        let mut candidates = CandidateSet::new(domain);

        if let Some(element) = document.nearest_element(node) {
            self.by_id(document, element, &mut candidates);
            self.by_classes(document, element, &mut candidates);
            self.by_attributes(document, element, &mut candidates);
            self.by_text(document, element, &mut candidates);
            self.by_parent(document, element, &mut candidates);
            self.by_descendant(document, element, &mut candidates);
        }

        if candidates.is_empty() {
            match document.nearest_element(node) {
                Some(element) => {
                    candidates.push("Generic fallback", selector::css_path(document, element));
                }
                // Keeps the list non-empty; the bare `domain##` rule matches nothing useful.
                None => candidates.push(NO_ELEMENT_DESCRIPTION, ""),
            }
        }

        let candidates = candidates.into_vec();
        tracing::debug!(node = %node, count = candidates.len(), "synthesized filter candidates");
        candidates
    }

    /// Class tokens that are likely to survive a page rebuild.
    pub fn stable_classes<'a>(&self, document: &'a Document, node: NodeId) -> Vec<&'a str> {
        document
            .class_list(node)
            .into_iter()
            .filter(|class| !self.is_noise_class(class))
            .collect()
    }

    /// Whether a class looks generated (hashed, framework-scoped, or our own highlight).
    pub fn is_noise_class(&self, class: &str) -> bool {
        if class.starts_with(&self.options.highlight_class) {
            return true;
        }
        if self
            .options
            .noise_prefixes
            .iter()
            .any(|prefix| class.starts_with(prefix.as_str()))
        {
            return true;
        }
        class.chars().count() >= self.options.noise_min_length && HASHED_TOKEN.is_match(class)
    }

    fn by_id(&self, document: &Document, node: NodeId, out: &mut CandidateSet) {
        if let (Some(tag), Some(id)) = (document.tag_name(node), document.element_id(node)) {
            out.push(
                "By ID (strongest)",
                format!("{tag}#{}", selector::escape_id(id)),
            );
        }
    }

    fn by_classes(&self, document: &Document, node: NodeId, out: &mut CandidateSet) {
        let Some(tag) = document.tag_name(node) else {
            return;
        };
        let classes = self.stable_classes(document, node);
        if !classes.is_empty() {
            out.push("By classes", format!("{tag}.{}", join_classes(&classes)));
        }
    }

    fn by_attributes(&self, document: &Document, node: NodeId, out: &mut CandidateSet) {
        let Some(tag) = document.tag_name(node) else {
            return;
        };
        for name in &self.options.attributes {
            if let Some(value) = document.attribute(node, name) {
                out.push(
                    format!("By attribute [{name}]"),
                    format!("{tag}[{name}=\"{}\"]", escape_attribute_value(value)),
                );
            }
        }
    }

    fn by_text(&self, document: &Document, node: NodeId, out: &mut CandidateSet) {
        let Some(tag) = document.tag_name(node) else {
            return;
        };
        let direct_text = document
            .children(node)
            .iter()
            .find_map(|child| match document.data(*child) {
                Some(NodeData::Text(text)) if !text.trim().is_empty() => Some(text.trim()),
                _ => None,
            });

        if let Some(text) = direct_text {
            let pattern = text_pattern(text, self.options.text_limit);
            if !pattern.is_empty() {
                out.push("By text content", format!("{tag}:has-text(/{pattern}/)"));
            }
        }
    }

    fn by_parent(&self, document: &Document, node: NodeId, out: &mut CandidateSet) {
        let (Some(tag), Some(parent)) = (document.tag_name(node), document.parent_element(node))
        else {
            return;
        };
        let Some(parent_tag) = document.tag_name(parent) else {
            return;
        };
        if UNSCOPED_PARENTS.contains(&parent_tag) {
            return;
        }

        if let Some(parent_id) = document.element_id(parent) {
            out.push(
                "By parent ID",
                format!("{parent_tag}#{} > {tag}", selector::escape_id(parent_id)),
            );
        } else if let Some(ancestor) = document
            .ancestors(parent)
            .find(|ancestor| document.element_id(*ancestor).is_some())
            && let (Some(ancestor_tag), Some(ancestor_id)) =
                (document.tag_name(ancestor), document.element_id(ancestor))
        {
            out.push(
                "By ancestor ID",
                format!("{ancestor_tag}#{} {tag}", selector::escape_id(ancestor_id)),
            );
        }

        let parent_classes = self.stable_classes(document, parent);
        if !parent_classes.is_empty() {
            out.push(
                "By parent classes",
                format!("{parent_tag}.{} > {tag}", join_classes(&parent_classes)),
            );
        }

        if let Some(position) = document
            .element_children(parent)
            .position(|sibling| sibling == node)
        {
            out.push(
                "By position in parent",
                format!("{parent_tag} > {tag}:nth-child({})", position + 1),
            );
        }
    }

    fn by_descendant(&self, document: &Document, node: NodeId, out: &mut CandidateSet) {
        let Some(tag) = document.tag_name(node) else {
            return;
        };
        let Some((descendant, sub_selector)) = document
            .descendants(node)
            .find_map(|candidate| identifying_selector(document, candidate).map(|s| (candidate, s)))
        else {
            return;
        };

        if document.parent(descendant) == Some(node) {
            out.push(
                "By identifying child",
                format!("{tag}:has(> {sub_selector})"),
            );
        } else {
            out.push(
                "By identifying descendant",
                format!("{tag}:has({sub_selector})"),
            );
        }
    }
}

/// Insertion-ordered candidates keyed by rule text; the first description for a rule wins.
struct CandidateSet {
    domain: String,
    by_rule: HashMap<String, usize>,
    entries: Vec<FilterCandidate>,
}

impl CandidateSet {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.trim().to_owned(),
            by_rule: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, description: impl Into<String>, selector: impl AsRef<str>) {
        let rule = format!("{}##{}", self.domain, selector.as_ref());
        if self.by_rule.contains_key(&rule) {
            return;
        }
        self.by_rule.insert(rule.clone(), self.entries.len());
        self.entries.push(FilterCandidate::new(description, rule));
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_vec(self) -> Vec<FilterCandidate> {
        self.entries
    }
}

fn identifying_selector(document: &Document, node: NodeId) -> Option<String> {
    let tag = document.tag_name(node)?;
    if let Some(label) = document.attribute(node, "aria-label") {
        return Some(format!(
            "{tag}[aria-label=\"{}\"]",
            escape_attribute_value(label)
        ));
    }
    if tag == "img"
        && let Some(src) = document.attribute(node, "src")
    {
        return Some(format!("img[src=\"{}\"]", escape_attribute_value(src)));
    }
    document
        .attribute(node, "data-testid")
        .map(|id| format!("{tag}[data-testid=\"{}\"]", escape_attribute_value(id)))
}

/// Dot-joined class tokens, escaped like ids so `md:flex` stays one class.
fn join_classes(classes: &[&str]) -> String {
    classes
        .iter()
        .map(|class| selector::escape_id(class))
        .collect::<Vec<_>>()
        .join(".")
}

fn escape_attribute_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Regex body for `:has-text(/.../)`: quotes and backslashes escaped, cut to `limit`
/// characters, then slashes escaped.
fn text_pattern(text: &str, limit: usize) -> String {
    let escaped = escape_attribute_value(text.trim());
    let mut truncated: String = escaped.chars().take(limit).collect();

    // A cut in the middle of an escape pair leaves a dangling backslash.
    let trailing = truncated.chars().rev().take_while(|ch| *ch == '\\').count();
    if trailing % 2 == 1 {
        truncated.pop();
    }

    truncated.replace('/', "\\/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const DOMAIN: &str = "example.com";

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

    fn element(doc: &mut Document, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = doc.create_element(tag);
        for (name, value) in attrs {
            doc.set_attribute(node, name, *value).unwrap();
        }
        doc.append_child(parent, node).unwrap();
        node
    }

    fn text(doc: &mut Document, parent: NodeId, value: &str) -> NodeId {
        let node = doc.create_text(value);
        doc.append_child(parent, node).unwrap();
        node
    }

    fn rules(candidates: &[FilterCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.rule.as_str()).collect()
    }

    #[test]
    fn id_class_and_text_rules_for_simple_div() {
        let Page { mut doc, body } = page();
        let section = element(&mut doc, body, "section", &[]);
        let div = element(&mut doc, section, "div", &[("id", "x"), ("class", "a b")]);
        text(&mut doc, div, "hello");

        let candidates = FilterSynthesizer::default().synthesize(&doc, div, DOMAIN);
        let rules = rules(&candidates);

        assert_eq!(rules[0], "example.com##div#x");
        assert!(rules.contains(&"example.com##div.a.b"));
        assert!(rules.contains(&"example.com##div:has-text(/hello/)"));
    }

    #[test]
    fn whitelisted_attributes_follow_configured_order() {
        let Page { mut doc, body } = page();
        let button = element(
            &mut doc,
            body,
            "button",
            &[("title", "Close"), ("data-testid", "close-btn"), ("role", "button")],
        );

        let candidates = FilterSynthesizer::default().synthesize(&doc, button, DOMAIN);
        assert_eq!(
            rules(&candidates),
            vec![
                "example.com##button[data-testid=\"close-btn\"]",
                "example.com##button[title=\"Close\"]",
            ]
        );
        assert_eq!(candidates[0].description, "By attribute [data-testid]");
    }

    #[test]
    fn noise_classes_are_dropped() {
        let Page { mut doc, body } = page();
        let div = element(
            &mut doc,
            body,
            "div",
            &[(
                "class",
                "card css-1q2w3e sc-AxjAm a8Fk2LmQz9XpR4tYw7Ue dompick-highlight",
            )],
        );

        let synthesizer = FilterSynthesizer::default();
        assert_eq!(synthesizer.stable_classes(&doc, div), vec!["card"]);
        let candidates = synthesizer.synthesize(&doc, div, DOMAIN);
        assert_eq!(rules(&candidates), vec!["example.com##div.card"]);
    }

    #[test]
    fn short_or_hyphenated_long_classes_are_kept() {
        let synthesizer = FilterSynthesizer::default();
        assert!(!synthesizer.is_noise_class("navigation-menu-container"));
        assert!(!synthesizer.is_noise_class("abc123"));
        assert!(synthesizer.is_noise_class("Zx81Qw7Er5Ty3Ui9Op2As"));
    }

    #[test]
    fn text_is_escaped_and_truncated() {
        let Page { mut doc, body } = page();
        let p = element(&mut doc, body, "p", &[]);
        let span = element(&mut doc, p, "span", &[]);
        text(&mut doc, span, "ignored nested text");
        text(&mut doc, p, "   ");
        text(&mut doc, p, "  Say \"hi\" to a/b  ");

        let candidates = FilterSynthesizer::default().synthesize(&doc, p, DOMAIN);
        assert!(rules(&candidates).contains(&r#"example.com##p:has-text(/Say \"hi\" to a\/b/)"#));
    }

    #[test]
    fn text_pattern_limits_length_without_dangling_escape() {
        let long = "x".repeat(80);
        assert_eq!(text_pattern(&long, 50).chars().count(), 50);

        let awkward = format!("{}\"tail", "y".repeat(49));
        let pattern = text_pattern(&awkward, 50);
        assert_eq!(pattern, "y".repeat(49));
    }

    #[test]
    fn parent_scoping_prefers_parent_id_then_classes_then_position() {
        let Page { mut doc, body } = page();
        let nav = element(&mut doc, body, "nav", &[("id", "top"), ("class", "bar")]);
        element(&mut doc, nav, "a", &[]);
        let link = element(&mut doc, nav, "a", &[]);

        let candidates = FilterSynthesizer::default().synthesize(&doc, link, DOMAIN);
        assert_eq!(
            rules(&candidates),
            vec![
                "example.com##nav#top > a",
                "example.com##nav.bar > a",
                "example.com##nav > a:nth-child(2)",
            ]
        );
    }

    #[test]
    fn distant_ancestor_id_uses_descendant_combinator() {
        let Page { mut doc, body } = page();
        let main = element(&mut doc, body, "main", &[("id", "feed")]);
        let article = element(&mut doc, main, "article", &[]);
        let footer = element(&mut doc, article, "footer", &[]);

        let candidates = FilterSynthesizer::default().synthesize(&doc, footer, DOMAIN);
        assert!(rules(&candidates).contains(&"example.com##main#feed footer"));
        assert!(rules(&candidates).contains(&"example.com##article > footer:nth-child(1)"));
    }

    #[test]
    fn body_children_are_not_parent_scoped() {
        let Page { mut doc, body } = page();
        let div = element(&mut doc, body, "div", &[]);

        let candidates = FilterSynthesizer::default().synthesize(&doc, div, DOMAIN);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].description, "Generic fallback");
        assert_eq!(candidates[0].rule, "example.com##html > body > div");
    }

    #[test]
    fn identifying_descendants_produce_has_rules() {
        let Page { mut doc, body } = page();
        let card = element(&mut doc, body, "div", &[]);
        element(&mut doc, card, "button", &[("aria-label", "Dismiss")]);

        let wrapper = element(&mut doc, body, "aside", &[]);
        let figure = element(&mut doc, wrapper, "figure", &[]);
        element(&mut doc, figure, "img", &[("src", "/ads/banner.png")]);

        let synthesizer = FilterSynthesizer::default();
        let card_rules = synthesizer.synthesize(&doc, card, DOMAIN);
        assert!(
            rules(&card_rules).contains(&"example.com##div:has(> button[aria-label=\"Dismiss\"])")
        );

        let aside_rules = synthesizer.synthesize(&doc, wrapper, DOMAIN);
        assert_eq!(
            rules(&aside_rules),
            vec!["example.com##aside:has(img[src=\"/ads/banner.png\"])"]
        );
    }

    #[test]
    fn duplicate_rules_keep_first_description() {
        let mut set = CandidateSet::new(DOMAIN);
        set.push("first", "div.a");
        set.push("second", "div.a");
        set.push("third", "div.b");
        let entries = set.into_vec();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "first");
    }

    #[test]
    fn rules_are_unique_and_never_empty_across_a_page() {
        let Page { mut doc, body } = page();
        let list = element(&mut doc, body, "ul", &[("class", "items")]);
        for label in ["one", "two", "one"] {
            let li = element(&mut doc, list, "li", &[("class", "items"), ("title", label)]);
            text(&mut doc, li, label);
        }
        let orphan = doc.create_element("span");

        let synthesizer = FilterSynthesizer::default();
        let nodes: Vec<NodeId> = doc
            .descendants(doc.root())
            .chain(std::iter::once(orphan))
            .collect();
        for node in nodes {
            let candidates = synthesizer.synthesize(&doc, node, DOMAIN);
            assert!(!candidates.is_empty());
            let unique: HashSet<&str> = candidates.iter().map(|c| c.rule.as_str()).collect();
            assert_eq!(unique.len(), candidates.len());
        }
    }

    #[test]
    fn ids_and_class_tokens_are_escaped() {
        let Page { mut doc, body } = page();
        let wrapper = element(&mut doc, body, "div", &[("id", "app:root")]);
        let card = element(&mut doc, wrapper, "div", &[("class", "md:flex")]);
        let item = element(&mut doc, card, "p", &[("id", "a.b"), ("class", "w-[50%]")]);

        let rules = rules_for(&doc, item).join("\n");
        assert!(rules.contains(r"example.com##p#a\.b"));
        assert!(rules.contains(r"example.com##p.w-\[50%\]"));
        assert!(rules.contains(r"example.com##div.md\:flex > p"));

        let card_rules = rules_for(&doc, card);
        assert!(card_rules.contains(&r"example.com##div#app\:root > div".to_owned()));
    }

    #[test]
    fn input_without_an_element_is_marked_invalid() {
        let Page { doc, .. } = page();
        let synthesizer = FilterSynthesizer::default();

        for node in [doc.root(), NodeId::from_index(999)] {
            let candidates = synthesizer.synthesize(&doc, node, DOMAIN);
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].description, NO_ELEMENT_DESCRIPTION);
            assert_eq!(candidates[0].rule, "example.com##");
        }
    }

    fn rules_for(doc: &Document, node: NodeId) -> Vec<String> {
        FilterSynthesizer::default()
            .synthesize(doc, node, DOMAIN)
            .into_iter()
            .map(|candidate| candidate.rule)
            .collect()
    }

    #[test]
    fn text_nodes_are_retargeted_to_their_element() {
        let Page { mut doc, body } = page();
        let h1 = element(&mut doc, body, "h1", &[("id", "title")]);
        let node = text(&mut doc, h1, "Headline");

        let candidates = FilterSynthesizer::default().synthesize(&doc, node, DOMAIN);
        assert_eq!(candidates[0].rule, "example.com##h1#title");
    }
}
