//! Consumer panels shown next to the element tree.
//!
//! Each panel owns the artifacts of its own last pick. The app routes a commit to the panel named
//! by the commit's source tag and broadcasts picker state changes to every panel.

pub mod filters;
pub mod inspector;

use crossterm::event::KeyEvent;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders};

use crate::app::picker::PickerState;
use crate::app::report::ElementReport;
use crate::infra::highlight::Highlighter;

pub use filters::FiltersPanel;
pub use inspector::InspectorPanel;

/// Requests a panel hands back to the app after seeing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    /// Start a pick for this panel, or cancel the running one.
    TogglePick,
    /// Write the current report to disk.
    WriteReport,
}

/// Shared services for [`Panel::update`].
pub struct PanelContext<'a> {
    pub highlighter: &'a Highlighter,
    pub theme: &'a str,
}

/// Capabilities every panel provides to the host app.
pub trait Panel {
    /// Stable id, also the pick source tag and the preference key.
    fn id(&self) -> &'static str;

    fn title(&self) -> &'static str;

    fn render(&self, frame: &mut Frame<'_>, area: Rect, has_focus: bool);

    /// Handle a key routed to the panel. Keys the panel does not claim return `None`.
    fn bind_events(&mut self, key: KeyEvent) -> Option<PanelAction>;

    /// Receive the artifacts of a pick committed on behalf of this panel.
    fn update(&mut self, report: ElementReport, context: &PanelContext<'_>);

    fn on_picker_state_changed(&mut self, state: &PickerState);

    /// Report currently shown, if any.
    fn report(&self) -> Option<&ElementReport>;
}

/// Panels in their default order.
pub fn default_panels() -> Vec<Box<dyn Panel>> {
    vec![
        Box::new(InspectorPanel::default()),
        Box::new(FiltersPanel::default()),
    ]
}

/// Ids of [`default_panels`], in order.
pub fn panel_ids() -> Vec<&'static str> {
    vec![inspector::PANEL_ID, filters::PANEL_ID]
}

/// Whether the picker is currently running on behalf of `id`.
pub(crate) fn is_picking_for(state: &PickerState, id: &str) -> bool {
    matches!(state, PickerState::Active { source } if source == id)
}

pub(crate) fn panel_block(title: String, has_focus: bool) -> Block<'static> {
    let border_color = if has_focus {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
}
