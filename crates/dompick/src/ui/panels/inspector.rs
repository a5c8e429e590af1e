//! Inspector panel: element summary, selector path, and highlighted markup.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};

use crate::app::picker::PickerState;
use crate::app::report::ElementReport;
use crate::infra::highlight::{HighlightResult, HighlightSpan};
use crate::ui::panels::{Panel, PanelAction, PanelContext, is_picking_for, panel_block};

pub const PANEL_ID: &str = "inspector";

#[derive(Debug, Default)]
pub struct InspectorPanel {
    report: Option<ElementReport>,
    markup: Option<HighlightResult>,
    picking: bool,
    scroll: u16,
}

impl InspectorPanel {
    pub fn is_picking(&self) -> bool {
        self.picking
    }

    fn summary_lines(report: &ElementReport) -> Vec<Line<'static>> {
        let label = Style::default().fg(Color::Gray);
        let mut lines = vec![Line::from(vec![
            Span::styled("Tag", label),
            Span::raw(": "),
            Span::styled(format!("<{}>", report.tag), Style::default().fg(Color::Cyan)),
        ])];
        if let Some(id) = &report.id {
            lines.push(Line::from(vec![
                Span::styled("Id", label),
                Span::raw(": "),
                Span::raw(id.clone()),
            ]));
        }
        if !report.classes.is_empty() {
            lines.push(Line::from(vec![
                Span::styled("Classes", label),
                Span::raw(": "),
                Span::raw(report.classes.join(" ")),
            ]));
        }
        lines.push(Line::from(vec![
            Span::styled("Path", label),
            Span::raw(": "),
            Span::styled(
                report.path.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]));
        lines
    }
}

impl Panel for InspectorPanel {
    fn id(&self) -> &'static str {
        PANEL_ID
    }

    fn title(&self) -> &'static str {
        "Inspector"
    }

    fn render(&self, frame: &mut Frame<'_>, area: Rect, has_focus: bool) {
        let mut title = self.title().to_owned();
        if self.picking {
            title.push_str(" · picking…");
        }
        let block = panel_block(title, has_focus);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(report) = &self.report else {
            let placeholder = Paragraph::new("Press p, then move to an element and hit enter")
                .style(
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )
                .wrap(Wrap { trim: true });
            frame.render_widget(placeholder, inner);
            return;
        };

        let mut lines = Self::summary_lines(report);
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            "Markup",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
        if let Some(markup) = &self.markup {
            lines.extend(markup.lines.iter().map(|line| {
                Line::from(
                    line.spans
                        .iter()
                        .map(highlight_span_to_span)
                        .collect::<Vec<_>>(),
                )
            }));
        }

        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0));
        frame.render_widget(paragraph, inner);
    }

    fn bind_events(&mut self, key: KeyEvent) -> Option<PanelAction> {
        match key.code {
            KeyCode::Char('p') => Some(PanelAction::TogglePick),
            KeyCode::Char('w') => Some(PanelAction::WriteReport),
            KeyCode::PageDown | KeyCode::Char('J') => {
                self.scroll = self.scroll.saturating_add(1);
                None
            }
            KeyCode::PageUp | KeyCode::Char('K') => {
                self.scroll = self.scroll.saturating_sub(1);
                None
            }
            _ => None,
        }
    }

    fn update(&mut self, report: ElementReport, context: &PanelContext<'_>) {
        self.markup = Some(
            context
                .highlighter
                .highlight_markup(&report.markup, context.theme),
        );
        self.report = Some(report);
        self.scroll = 0;
    }

    fn on_picker_state_changed(&mut self, state: &PickerState) {
        self.picking = is_picking_for(state, PANEL_ID);
    }

    fn report(&self) -> Option<&ElementReport> {
        self.report.as_ref()
    }
}

fn highlight_span_to_span(span: &HighlightSpan) -> Span<'static> {
    let mut style = Style::default();
    if let Some(color) = span.style.foreground {
        style = style.fg(Color::Rgb(color.r, color.g, color.b));
    }
    if span.style.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if span.style.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if span.style.underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    Span::styled(span.content.clone(), style)
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
            id: Some("x".into()),
            classes: vec!["a".into(), "b".into()],
            path: "#x".into(),
            filters: vec![FilterCandidate::new("By ID (strongest)", "example.com##div#x")],
            markup: "<div id=\"x\" class=\"a b\">hello</div>".into(),
            generated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn rendered(panel: &InspectorPanel) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.size();
                panel.render(frame, area, true);
            })
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn renders_placeholder_before_first_pick() {
        let panel = InspectorPanel::default();
        assert!(rendered(&panel).contains("Press p"));
    }

    #[test]
    fn renders_summary_and_markup_after_update() {
        let mut panel = InspectorPanel::default();
        let highlighter = Highlighter::new();
        panel.update(
            report(),
            &PanelContext {
                highlighter: &highlighter,
                theme: "base16-ocean.dark",
            },
        );

        let screen = rendered(&panel);
        assert!(screen.contains("<div>"));
        assert!(screen.contains("Path: #x"));
        assert!(screen.contains("Classes: a b"));
        assert!(screen.contains("hello"));
    }

    #[test]
    fn tracks_picker_state_for_own_source_only() {
        let mut panel = InspectorPanel::default();
        panel.on_picker_state_changed(&PickerState::Active {
            source: "filters".into(),
        });
        assert!(!panel.is_picking());

        panel.on_picker_state_changed(&PickerState::Active {
            source: PANEL_ID.into(),
        });
        assert!(panel.is_picking());
        assert!(rendered(&panel).contains("picking"));

        panel.on_picker_state_changed(&PickerState::Idle);
        assert!(!panel.is_picking());
    }

    #[test]
    fn claims_pick_and_report_keys() {
        let mut panel = InspectorPanel::default();
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(
            panel.bind_events(key(KeyCode::Char('p'))),
            Some(PanelAction::TogglePick)
        );
        assert_eq!(
            panel.bind_events(key(KeyCode::Char('w'))),
            Some(PanelAction::WriteReport)
        );
        assert_eq!(panel.bind_events(key(KeyCode::Char('x'))), None);
    }
}
