//! Application loop for the interactive picker.

use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Tabs};
use ratatui::{Frame, Terminal};
use serde_json::Value;

use crate::app::filters::FilterSynthesizer;
use crate::app::host::DocumentHost;
use crate::app::picker::{
    Dispatch, PickCommit, PickRequest, PickerController, PickerHost, PickerState, PointerEvent,
};
use crate::app::prefs::PreferenceStore;
use crate::app::report::{ElementReport, ReportOptions, Reporter};
use crate::domain::document::Document;
use crate::domain::model::NodeId;
use crate::infra::config::Config;
use crate::infra::highlight::Highlighter;
use crate::ui::panels::{Panel, PanelAction, PanelContext, default_panels, filters, inspector};
use crate::ui::tree::{ElementTree, ElementTreeState};

const TICK_RATE: Duration = Duration::from_millis(120);

/// Interactive element picker over a loaded document.
pub struct UiApp {
    config: Config,
    host: DocumentHost,
    picker: PickerController,
    commit_sender: Sender<PickCommit>,
    commits: Receiver<PickCommit>,
    tree: ElementTreeState,
    tree_view: ElementTree,
    panels: Vec<Box<dyn Panel>>,
    active: usize,
    prefs: PreferenceStore,
    synthesizer: FilterSynthesizer,
    highlighter: Highlighter,
    reporter: Reporter,
    report_options: ReportOptions,
    report_dir: PathBuf,
    domain: String,
    status: Option<StatusMessage>,
    should_quit: bool,
}

impl UiApp {
    /// Prepare the app. Preferences are loaded here and decide panel order and the active tab.
    pub fn new(
        document: Document,
        domain: impl Into<String>,
        config: Config,
        mut prefs: PreferenceStore,
    ) -> Result<Self> {
        prefs.load();
        let panels = ordered_panels(default_panels(), &prefs);
        if panels.is_empty() {
            bail!("every panel is disabled in preferences; run `dompick prefs reset`");
        }
        let active = prefs
            .get_str("active_tab")
            .and_then(|id| panels.iter().position(|panel| panel.id() == id))
            .unwrap_or(0);

        let (commit_sender, commits) = mpsc::channel();
        let tree = ElementTreeState::from_document(&document);
        let mut app = Self {
            host: DocumentHost::new(document, &config.picker),
            synthesizer: FilterSynthesizer::from_config(&config),
            report_options: ReportOptions::from_config(&config),
            reporter: Reporter::new()?,
            highlighter: Highlighter::new(),
            report_dir: PathBuf::from("."),
            picker: PickerController::new(),
            commit_sender,
            commits,
            tree,
            tree_view: ElementTree,
            panels,
            active,
            prefs,
            domain: domain.into(),
            status: None,
            should_quit: false,
            config,
        };
        app.broadcast_picker_state();
        Ok(app)
    }

    /// Directory that receives reports written with `w`.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Launch the terminal UI and enter the event loop.
    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to initialize terminal")?;
        terminal.hide_cursor().ok();

        let event_loop_result = self.event_loop(&mut terminal);
        self.picker.stop(&mut self.host);

        disable_raw_mode().ok();
        let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
        let _ = terminal.show_cursor();

        event_loop_result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|frame| self.render(frame))?;
            self.tick();

            if self.should_quit {
                break;
            }

            if event::poll(TICK_RATE)? {
                let ev = event::read()?;
                self.handle_event(ev)?;
            }
        }
        Ok(())
    }

    pub fn picker_state(&self) -> PickerState {
        self.picker.state()
    }

    pub fn host(&self) -> &DocumentHost {
        &self.host
    }

    pub fn tree(&self) -> &ElementTreeState {
        &self.tree
    }

    pub fn prefs(&self) -> &PreferenceStore {
        &self.prefs
    }

    pub fn panel_ids(&self) -> Vec<&'static str> {
        self.panels.iter().map(|panel| panel.id()).collect()
    }

    pub fn active_panel_id(&self) -> &'static str {
        self.panels[self.active].id()
    }

    pub fn panel_report(&self, id: &str) -> Option<&ElementReport> {
        self.panels
            .iter()
            .find(|panel| panel.id() == id)
            .and_then(|panel| panel.report())
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|status| status.text.as_str())
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn render(&mut self, frame: &mut Frame<'_>) {
        let size = frame.size();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(2)])
            .split(size);

        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(layout[0]);

        let right_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(3)])
            .split(main_chunks[1]);

        let host = &self.host;
        self.tree_view.render(
            frame,
            main_chunks[0],
            &self.tree,
            true,
            |node| host.is_highlighted(node),
            |node| host.is_tool_chrome(node),
        );

        let tabs: Vec<usize> = (0..self.panels.len())
            .filter(|index| *index == self.active || self.shows_in_toolbar(*index))
            .collect();
        let titles: Vec<Line<'_>> = tabs
            .iter()
            .map(|index| Line::raw(self.panels[*index].title()))
            .collect();
        let selected = tabs
            .iter()
            .position(|index| *index == self.active)
            .unwrap_or(0);
        let tabs = Tabs::new(titles)
            .select(selected)
            .style(Style::default().fg(Color::Gray))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .divider("│");
        frame.render_widget(tabs, right_chunks[0]);

        self.panels[self.active].render(frame, right_chunks[1], true);

        self.render_status(frame, layout[1]);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let line = match &self.status {
            Some(status) => {
                let style = match status.level {
                    StatusLevel::Info => Style::default().fg(Color::Gray),
                    StatusLevel::Success => Style::default().fg(Color::Green),
                    StatusLevel::Error => Style::default().fg(Color::Red),
                };
                Line::styled(status.text.clone(), style)
            }
            None if self.is_compact() => Line::default(),
            None => {
                let key = Style::default().fg(Color::Cyan);
                let pick_hint = if self.picker.is_active() {
                    " pick · "
                } else {
                    " start pick · "
                };
                Line::from(vec![
                    Span::styled("j/k", key),
                    Span::raw(" move · "),
                    Span::styled("p", key),
                    Span::raw(" start/cancel pick · "),
                    Span::styled("↵", key),
                    Span::raw(pick_hint),
                    Span::styled("tab", key),
                    Span::raw(" panel · "),
                    Span::styled("/", key),
                    Span::raw(" filter · "),
                    Span::styled("w", key),
                    Span::raw(" write report · "),
                    Span::styled("q", key),
                    Span::raw(" quit"),
                ])
                .style(Style::default().fg(Color::DarkGray))
            }
        };
        frame.render_widget(Paragraph::new(line), inner);
    }

    fn is_compact(&self) -> bool {
        self.prefs
            .get("ui.compact")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the panel gets a tab title even while another panel is active.
    fn shows_in_toolbar(&self, index: usize) -> bool {
        self.prefs
            .component_state(self.panels[index].id())
            .and_then(|state| state.get("show_in_toolbar"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    fn tick(&mut self) {
        if let Some(status) = &self.status
            && status.is_expired()
        {
            self.status = None;
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Key(key) => self.handle_key_event(key)?,
            Event::Resize(..) => {}
            Event::Mouse(_) => {}
            Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
        }
        Ok(())
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
        {
            self.quit();
            return Ok(());
        }

        if self.tree.is_filter_active() {
            self.handle_filter_input(key);
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Esc => {
                if self.picker.stop(&mut self.host) {
                    self.broadcast_picker_state();
                    self.set_status(StatusLevel::Info, "Pick cancelled");
                } else {
                    self.tree.clear_filter();
                }
            }
            KeyCode::Char('/') => self.tree.begin_filter(),
            KeyCode::Char('j') | KeyCode::Down => {
                if self.tree.select_next() {
                    self.pointer_moved();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.tree.select_previous() {
                    self.pointer_moved();
                }
            }
            KeyCode::Char('h') | KeyCode::Left => {
                if self.tree.collapse_or_parent() {
                    self.pointer_moved();
                }
            }
            KeyCode::Char('l') | KeyCode::Right => {
                if self.tree.expand_or_enter() {
                    self.pointer_moved();
                }
            }
            KeyCode::Enter => self.click_selected(),
            KeyCode::Tab => self.switch_panel(1),
            KeyCode::BackTab => self.switch_panel(self.panels.len() - 1),
            _ => {
                if let Some(action) = self.panels[self.active].bind_events(key) {
                    self.perform(action)?;
                }
            }
        }
        Ok(())
    }

    fn handle_filter_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => self.tree.end_filter(),
            KeyCode::Backspace => self.tree.pop_filter_char(),
            KeyCode::Char(ch) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    self.tree.push_filter_char(ch);
                }
            }
            _ => {}
        }
    }

    fn perform(&mut self, action: PanelAction) -> Result<()> {
        match action {
            PanelAction::TogglePick => self.toggle_pick(),
            PanelAction::WriteReport => self.write_report(),
        }
        Ok(())
    }

    fn toggle_pick(&mut self) {
        if self.picker.stop(&mut self.host) {
            self.broadcast_picker_state();
            self.set_status(StatusLevel::Info, "Pick cancelled");
            return;
        }

        let source = self.active_panel_id();
        let request = PickRequest::from_config(source, &self.config);
        let sender = self.commit_sender.clone();
        let started = self.picker.start(&mut self.host, request, move |commit| {
            if sender.send(commit).is_err() {
                tracing::debug!("commit receiver dropped");
            }
        });
        if started {
            self.pointer_moved();
            self.set_status(
                StatusLevel::Info,
                "Picking: move to an element and press enter (esc cancels)",
            );
        }
        self.broadcast_picker_state();
    }

    fn pointer_moved(&mut self) {
        if let Some(target) = self.tree.selected_node() {
            self.picker
                .handle(&mut self.host, PointerEvent::Move { target });
        }
    }

    fn click_selected(&mut self) {
        let Some(target) = self.tree.selected_node() else {
            return;
        };
        if !self.picker.is_active() {
            self.set_status(StatusLevel::Info, "Press p to start picking");
            return;
        }

        match self
            .picker
            .handle(&mut self.host, PointerEvent::Click { target })
        {
            Dispatch::Consumed => {
                self.drain_commits();
                self.broadcast_picker_state();
            }
            Dispatch::Continue => {
                self.set_status(StatusLevel::Info, "That element belongs to the picker itself");
            }
        }
    }

    fn drain_commits(&mut self) {
        while let Ok(commit) = self.commits.try_recv() {
            if let Err(err) = self.deliver(commit) {
                self.set_status(StatusLevel::Error, format!("{err:#}"));
            }
        }
    }

    fn deliver(&mut self, commit: PickCommit) -> Result<()> {
        let Some(report) = ElementReport::build(
            self.host.document(),
            commit.node,
            &self.domain,
            &self.synthesizer,
        )?
        else {
            bail!("picked node {} is not inside an element", commit.node);
        };
        let path = report.path.clone();

        let context = PanelContext {
            highlighter: &self.highlighter,
            theme: &self.config.ui.theme,
        };
        if !self.panels.iter().any(|panel| panel.id() == commit.source) {
            bail!("no panel named '{}' to receive the pick", commit.source);
        }
        let targets = commit_targets(&commit.source);
        for panel in &mut self.panels {
            if targets.contains(&panel.id()) {
                panel.update(report.clone(), &context);
            }
        }

        self.set_status(StatusLevel::Success, format!("Picked {path}"));
        Ok(())
    }

    fn write_report(&mut self) {
        let panel = &self.panels[self.active];
        let Some(report) = panel.report() else {
            self.set_status(StatusLevel::Info, "Nothing picked yet");
            return;
        };

        let mut options = self.report_options.clone();
        options.output_path = Some(self.report_dir.join(format!(
            "dompick-{}-{}.{}",
            panel.id(),
            report.node.index(),
            options.format.extension()
        )));

        match self.reporter.write(report, &options) {
            Ok(output) => {
                let path = output
                    .output_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                self.set_status(StatusLevel::Success, format!("Report written to {path}"));
            }
            Err(err) => self.set_status(StatusLevel::Error, format!("{err:#}")),
        }
    }

    fn switch_panel(&mut self, offset: usize) {
        if self.panels.is_empty() {
            return;
        }
        self.active = (self.active + offset) % self.panels.len();
        let id = self.active_panel_id();
        self.prefs.set("active_tab", Value::String(id.to_owned()));
    }

    fn broadcast_picker_state(&mut self) {
        let state = self.picker.state();
        for panel in &mut self.panels {
            panel.on_picker_state_changed(&state);
        }
    }

    fn quit(&mut self) {
        if self.picker.stop(&mut self.host) {
            self.broadcast_picker_state();
        }
        self.prefs.flush();
        self.should_quit = true;
    }

    fn set_status<S: Into<String>>(&mut self, level: StatusLevel, message: S) {
        self.status = Some(StatusMessage::new(level, message.into()));
    }

    /// Move the tree cursor to `node` as if the pointer travelled there.
    pub fn point_at(&mut self, node: NodeId) {
        self.tree.focus_node(node);
        self.pointer_moved();
    }
}

/// Panels that show a pick requested by `source`. Inspector picks also feed the filter list.
fn commit_targets(source: &str) -> Vec<&str> {
    let mut targets = vec![source];
    if source == inspector::PANEL_ID {
        targets.push(filters::PANEL_ID);
    }
    targets
}

/// Enabled panels in the order recorded in preferences.
fn ordered_panels(mut panels: Vec<Box<dyn Panel>>, prefs: &PreferenceStore) -> Vec<Box<dyn Panel>> {
    let order: Vec<String> = prefs
        .get("component_order")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let mut ordered = Vec::with_capacity(panels.len());
    for id in &order {
        if let Some(position) = panels.iter().position(|panel| panel.id() == id) {
            ordered.push(panels.remove(position));
        }
    }
    ordered.append(&mut panels);

    ordered.retain(|panel| {
        prefs
            .component_state(panel.id())
            .and_then(|state| state.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    });
    ordered
}

#[derive(Debug)]
struct StatusMessage {
    level: StatusLevel,
    text: String,
    expires_at: Instant,
}

impl StatusMessage {
    fn new(level: StatusLevel, text: String) -> Self {
        Self {
            level,
            text,
            expires_at: Instant::now() + Duration::from_secs(4),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusLevel {
    Info,
    Success,
    Error,
}
