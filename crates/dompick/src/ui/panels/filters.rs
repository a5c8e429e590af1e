//! Filters panel: cosmetic filter candidates for the picked element.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState, Paragraph, Wrap};

use crate::app::picker::PickerState;
use crate::app::report::ElementReport;
use crate::ui::panels::{Panel, PanelAction, PanelContext, is_picking_for, panel_block};

pub const PANEL_ID: &str = "filters";

#[derive(Debug, Default)]
pub struct FiltersPanel {
    report: Option<ElementReport>,
    selected: usize,
    picking: bool,
}

impl FiltersPanel {
    /// Rule under the cursor.
    pub fn selected_rule(&self) -> Option<&str> {
        self.report
            .as_ref()
            .and_then(|report| report.filters.get(self.selected))
            .map(|candidate| candidate.rule.as_str())
    }

    pub fn is_picking(&self) -> bool {
        self.picking
    }

    fn candidate_count(&self) -> usize {
        self.report
            .as_ref()
            .map(|report| report.filters.len())
            .unwrap_or(0)
    }
}

impl Panel for FiltersPanel {
    fn id(&self) -> &'static str {
        PANEL_ID
    }

    fn title(&self) -> &'static str {
        "Filters"
    }

    fn render(&self, frame: &mut Frame<'_>, area: Rect, has_focus: bool) {
        let mut title = match &self.report {
            Some(report) if !report.domain.is_empty() => format!("Filters · {}", report.domain),
            _ => self.title().to_owned(),
        };
        if self.picking {
            title.push_str(" · picking…");
        }
        let block = panel_block(title, has_focus);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(report) = &self.report else {
            let placeholder = Paragraph::new("Press p to pick an element to block")
                .style(
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )
                .wrap(Wrap { trim: true });
            frame.render_widget(placeholder, inner);
            return;
        };

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(inner);

        let items: Vec<ListItem<'_>> = report
            .filters
            .iter()
            .map(|candidate| {
                ListItem::new(vec![
                    Line::raw(candidate.rule.clone()),
                    Line::from(Span::styled(
                        format!("  {}", candidate.description),
                        Style::default().fg(Color::DarkGray),
                    )),
                ])
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(self.selected.min(report.filters.len().saturating_sub(1))));
        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▸ ");
        frame.render_stateful_widget(list, layout[0], &mut list_state);

        let footer = Paragraph::new(Line::from(vec![
            Span::styled("[ ]", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" select · {} candidates", report.filters.len())),
        ]))
        .style(Style::default().fg(Color::Gray));
        frame.render_widget(footer, layout[1]);
    }

    fn bind_events(&mut self, key: KeyEvent) -> Option<PanelAction> {
        match key.code {
            KeyCode::Char('p') => Some(PanelAction::TogglePick),
            KeyCode::Char('w') => Some(PanelAction::WriteReport),
            KeyCode::Char(']') => {
                if self.selected + 1 < self.candidate_count() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Char('[') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            _ => None,
        }
    }

    fn update(&mut self, report: ElementReport, _context: &PanelContext<'_>) {
        self.report = Some(report);
        self.selected = 0;
    }

    fn on_picker_state_changed(&mut self, state: &PickerState) {
        self.picking = is_picking_for(state, PANEL_ID);
    }

    fn report(&self) -> Option<&ElementReport> {
        self.report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::domain::model::{FilterCandidate, NodeId};
    use crate::infra::highlight::Highlighter;

    fn report() -> ElementReport {
        ElementReport {
            domain: "example.com".into(),
            node: NodeId::from_index(4),
            tag: "div".into(),
            id: None,
            classes: vec!["promo".into()],
            path: "html > body > div".into(),
            filters: vec![
                FilterCandidate::new("By classes", "example.com##div.promo"),
                FilterCandidate::new("By text content", "example.com##div:has-text(/Sale/)"),
            ],
            markup: "<div class=\"promo\">Sale</div>".into(),
            generated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn updated_panel() -> FiltersPanel {
        let mut panel = FiltersPanel::default();
        let highlighter = Highlighter::new();
        panel.update(
            report(),
            &PanelContext {
                highlighter: &highlighter,
                theme: "base16-ocean.dark",
            },
        );
        panel
    }

    #[test]
    fn brackets_move_between_candidates() {
        let mut panel = updated_panel();
        let key = |ch| KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE);

        assert_eq!(panel.selected_rule(), Some("example.com##div.promo"));
        assert_eq!(panel.bind_events(key(']')), None);
        assert_eq!(
            panel.selected_rule(),
            Some("example.com##div:has-text(/Sale/)")
        );
        panel.bind_events(key(']'));
        assert_eq!(
            panel.selected_rule(),
            Some("example.com##div:has-text(/Sale/)")
        );
        panel.bind_events(key('['));
        panel.bind_events(key('['));
        assert_eq!(panel.selected_rule(), Some("example.com##div.promo"));
        assert_eq!(panel.bind_events(key('p')), Some(PanelAction::TogglePick));
    }

    #[test]
    fn renders_rules_with_descriptions() {
        let panel = updated_panel();
        let mut terminal = Terminal::new(TestBackend::new(60, 10)).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.size();
                panel.render(frame, area, false);
            })
            .unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();

        assert!(screen.contains("Filters · example.com"));
        assert!(screen.contains("example.com##div.promo"));
        assert!(screen.contains("By text content"));
        assert!(screen.contains("2 candidates"));
    }
}
