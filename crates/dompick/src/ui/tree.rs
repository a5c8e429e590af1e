//! Element tree component and state management.

use std::collections::HashSet;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::domain::document::Document;
use crate::domain::model::NodeId;

/// Navigable outline of the elements of a document.
#[derive(Debug, Default, Clone)]
pub struct ElementTreeState {
    entries: Vec<TreeEntry>,
    visible: Vec<usize>,
    selected: usize,
    collapsed: HashSet<usize>,
    filter: String,
    filter_active: bool,
    title: String,
}

#[derive(Debug, Clone)]
struct TreeEntry {
    node: NodeId,
    label: String,
    depth: usize,
    parent: Option<usize>,
    has_children: bool,
}

impl ElementTreeState {
    /// Build the outline from every element below the document node, in document order.
    pub fn from_document(document: &Document) -> Self {
        let mut state = Self {
            title: document.url().unwrap_or("snapshot").to_owned(),
            ..Self::default()
        };

        let mut stack: Vec<(NodeId, Option<usize>, usize)> = document
            .element_children(document.root())
            .map(|node| (node, None, 0))
            .collect();
        stack.reverse();

        while let Some((node, parent, depth)) = stack.pop() {
            let index = state.entries.len();
            state.entries.push(TreeEntry {
                node,
                label: element_label(document, node),
                depth,
                parent,
                has_children: false,
            });
            if let Some(parent_idx) = parent
                && let Some(parent_entry) = state.entries.get_mut(parent_idx)
            {
                parent_entry.has_children = true;
            }

            let children: Vec<NodeId> = document.element_children(node).collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(index), depth + 1));
            }
        }

        state.refresh_visible();
        state
    }

    /// Node under the cursor.
    pub fn selected_node(&self) -> Option<NodeId> {
        self.selected_entry_index()
            .and_then(|idx| self.entries.get(idx))
            .map(|entry| entry.node)
    }

    /// Move the cursor to `node`, expanding its ancestors.
    pub fn focus_node(&mut self, node: NodeId) {
        let Some(index) = self.entries.iter().position(|entry| entry.node == node) else {
            return;
        };
        let mut cursor = self.entries[index].parent;
        while let Some(idx) = cursor {
            self.collapsed.remove(&idx);
            cursor = self.entries[idx].parent;
        }
        self.refresh_visible();
        if let Some(pos) = self.visible.iter().position(|idx| *idx == index) {
            self.selected = pos;
        }
    }

    /// Returns whether the cursor moved.
    pub fn select_next(&mut self) -> bool {
        if self.selected + 1 < self.visible.len() {
            self.selected += 1;
            true
        } else {
            false
        }
    }

    /// Returns whether the cursor moved.
    pub fn select_previous(&mut self) -> bool {
        if self.selected > 0 {
            self.selected -= 1;
            true
        } else {
            false
        }
    }

    /// Expand the selected element, or step into its first child when already expanded.
    pub fn expand_or_enter(&mut self) -> bool {
        let Some(index) = self.selected_entry_index() else {
            return false;
        };
        if !self.entries[index].has_children {
            return false;
        }
        if self.collapsed.remove(&index) {
            self.refresh_visible();
            return false;
        }
        match self.visible.iter().position(|idx| self.entries[*idx].parent == Some(index)) {
            Some(first_child) => {
                self.selected = first_child;
                true
            }
            None => false,
        }
    }

    /// Collapse the selected element, or move to its parent. Returns whether the cursor moved.
    pub fn collapse_or_parent(&mut self) -> bool {
        let Some(index) = self.selected_entry_index() else {
            return false;
        };
        if self.entries[index].has_children && self.collapsed.insert(index) {
            self.refresh_visible();
            return false;
        }
        if let Some(parent_idx) = self.entries[index].parent
            && let Some(pos) = self.visible.iter().position(|idx| *idx == parent_idx)
        {
            self.selected = pos;
            return true;
        }
        false
    }

    pub fn begin_filter(&mut self) {
        self.filter_active = true;
    }

    pub fn end_filter(&mut self) {
        self.filter_active = false;
    }

    pub fn is_filter_active(&self) -> bool {
        self.filter_active
    }

    pub fn push_filter_char(&mut self, ch: char) {
        self.filter.push(ch);
        self.refresh_visible();
    }

    pub fn pop_filter_char(&mut self) {
        self.filter.pop();
        self.refresh_visible();
    }

    pub fn clear_filter(&mut self) {
        if !self.filter.is_empty() {
            self.filter.clear();
            self.refresh_visible();
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn selected_index(&self) -> Option<usize> {
        if self.visible.is_empty() {
            None
        } else {
            Some(self.selected)
        }
    }

    /// Labels of the visible rows, in display order.
    pub fn visible_labels(&self) -> Vec<&str> {
        self.iter_visible()
            .map(|(_, entry)| entry.label.as_str())
            .collect()
    }

    fn is_collapsed(&self, entry_idx: usize) -> bool {
        self.collapsed.contains(&entry_idx)
    }

    fn refresh_visible(&mut self) {
        let previous = self.selected_node();
        self.visible.clear();
        if self.entries.is_empty() {
            return;
        }

        let needle = self.filter.to_ascii_lowercase();
        let filtering = !needle.is_empty();
        let mut matches = vec![!filtering; self.entries.len()];
        if filtering {
            for (idx, entry) in self.entries.iter().enumerate() {
                if entry.label.to_ascii_lowercase().contains(&needle) {
                    matches[idx] = true;
                    let mut parent = entry.parent;
                    while let Some(p) = parent {
                        matches[p] = true;
                        parent = self.entries[p].parent;
                    }
                }
            }
        }

        for idx in 0..self.entries.len() {
            if matches[idx] && (filtering || self.ancestors_expanded(idx)) {
                self.visible.push(idx);
            }
        }

        if let Some(node) = previous
            && let Some(pos) = self
                .visible
                .iter()
                .position(|idx| self.entries[*idx].node == node)
        {
            self.selected = pos;
        }
        if self.selected >= self.visible.len() {
            self.selected = self.visible.len().saturating_sub(1);
        }
    }

    fn ancestors_expanded(&self, idx: usize) -> bool {
        let mut cursor = self.entries[idx].parent;
        while let Some(parent) = cursor {
            if self.collapsed.contains(&parent) {
                return false;
            }
            cursor = self.entries[parent].parent;
        }
        true
    }

    fn selected_entry_index(&self) -> Option<usize> {
        self.visible.get(self.selected).copied()
    }

    /// Visible entries paired with their entry index.
    fn iter_visible(&self) -> impl Iterator<Item = (usize, &TreeEntry)> {
        self.visible
            .iter()
            .filter_map(|entry_idx| self.entries.get(*entry_idx).map(|entry| (*entry_idx, entry)))
    }
}

/// `tag#id.class` label, truncated to the first few classes.
fn element_label(document: &Document, node: NodeId) -> String {
    let mut label = document.tag_name(node).unwrap_or_default().to_owned();
    if let Some(id) = document.element_id(node) {
        label.push('#');
        label.push_str(id);
    }
    for class in document.class_list(node).into_iter().take(3) {
        label.push('.');
        label.push_str(class);
    }
    label
}

/// Renders [`ElementTreeState`], marking highlighted and chrome elements.
#[derive(Debug, Default)]
pub struct ElementTree;

impl ElementTree {
    pub fn render(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        state: &ElementTreeState,
        has_focus: bool,
        is_highlighted: impl Fn(NodeId) -> bool,
        is_chrome: impl Fn(NodeId) -> bool,
    ) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Elements · {}", state.title()));
        frame.render_widget(block.clone(), area);

        let inner = block.inner(area);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(inner);

        let filter_text = if state.filter().is_empty() {
            "⌕ filter (press /)".to_string()
        } else {
            format!("⌕ {}", state.filter())
        };
        let mut filter_style = Style::default().fg(Color::Gray);
        if state.is_filter_active() {
            filter_style = filter_style.add_modifier(Modifier::BOLD).fg(Color::Cyan);
        }
        frame.render_widget(Paragraph::new(filter_text).style(filter_style), layout[0]);

        if state.visible_len() == 0 {
            let placeholder = Paragraph::new("No elements match filter").style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            );
            frame.render_widget(placeholder, layout[1]);
            return;
        }

        let items: Vec<ListItem<'_>> = state
            .iter_visible()
            .map(|(entry_idx, entry)| {
                let symbol = if !entry.has_children {
                    "· "
                } else if state.is_collapsed(entry_idx) {
                    "▸ "
                } else {
                    "▾ "
                };
                let mut name_style = Style::default();
                if is_chrome(entry.node) {
                    name_style = name_style.fg(Color::DarkGray).add_modifier(Modifier::ITALIC);
                }
                if is_highlighted(entry.node) {
                    name_style = name_style
                        .fg(Color::Black)
                        .bg(Color::Yellow)
                        .add_modifier(Modifier::BOLD);
                }
                ListItem::new(Line::from(vec![
                    Span::raw("  ".repeat(entry.depth)),
                    Span::styled(symbol, Style::default().fg(Color::Yellow)),
                    Span::styled(entry.label.clone(), name_style),
                ]))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(state.selected_index());

        let highlight_style = if has_focus {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::Black).bg(Color::Gray)
        };
        let list = List::new(items)
            .highlight_style(highlight_style)
            .highlight_symbol("▸ ");
        frame.render_stateful_widget(list, layout[1], &mut list_state);
    }
}
