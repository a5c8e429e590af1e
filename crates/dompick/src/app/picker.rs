//! Interactive element picking.
//!
//! A [`PickerController`] owns at most one [`PickerSession`]. While a session is active the host
//! forwards pointer events to [`PickerController::handle`]; hovering highlights candidates and the
//! first click outside the tool's own chrome commits the target to the registered handler and ends
//! the session.

use std::fmt;

use crate::domain::model::NodeId;
use crate::infra::config::Config;

/// Environment the picker runs against: listener registration, cursor, and highlight toggling.
pub trait PickerHost {
    fn attach_listeners(&mut self);
    fn detach_listeners(&mut self);
    fn set_cursor(&mut self, cursor: Option<&str>);
    fn apply_highlight(&mut self, node: NodeId);
    fn clear_highlight(&mut self, node: NodeId);
    /// Whether `node` belongs to the tool's own UI rather than to the page.
    fn is_tool_chrome(&self, node: NodeId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Move { target: NodeId },
    Click { target: NodeId },
}

/// What the host should do with an event after the picker saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Let the event reach the page.
    Continue,
    /// Prevent the default action and stop propagation.
    Consumed,
}

/// Parameters for a pick session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    /// Panel that asked for the pick.
    pub source: String,
    pub cursor: String,
    pub highlight: bool,
}

impl PickRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            cursor: "crosshair".into(),
            highlight: true,
        }
    }

    pub fn from_config(source: impl Into<String>, config: &Config) -> Self {
        Self {
            source: source.into(),
            cursor: config.picker.cursor.clone(),
            highlight: config.picker.highlight,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into();
        self
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }
}

/// Value delivered to the commit handler when a pick completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickCommit {
    pub node: NodeId,
    pub source: String,
}

pub type CommitHandler = Box<dyn FnOnce(PickCommit)>;

/// State of one active pick interaction.
pub struct PickerSession {
    on_commit: Option<CommitHandler>,
    cursor: String,
    highlight: bool,
    current_hover: Option<NodeId>,
    source: String,
}

impl PickerSession {
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn highlight_enabled(&self) -> bool {
        self.highlight
    }

    pub fn current_hover(&self) -> Option<NodeId> {
        self.current_hover
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn clear_hover<H: PickerHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(previous) = self.current_hover.take() {
            host.clear_highlight(previous);
        }
    }
}

impl fmt::Debug for PickerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickerSession")
            .field("cursor", &self.cursor)
            .field("highlight", &self.highlight)
            .field("current_hover", &self.current_hover)
            .field("source", &self.source)
            .field("has_handler", &self.on_commit.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerState {
    Idle,
    Active { source: String },
}

/// Owner of the single pick session.
#[derive(Debug, Default)]
pub struct PickerController {
    session: Option<PickerSession>,
}

impl PickerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> PickerState {
        match &self.session {
            Some(session) => PickerState::Active {
                source: session.source.clone(),
            },
            None => PickerState::Idle,
        }
    }

    pub fn session(&self) -> Option<&PickerSession> {
        self.session.as_ref()
    }

    /// Begin a pick session. Returns `false` without side effects when one is already active.
    pub fn start<H, F>(&mut self, host: &mut H, request: PickRequest, on_commit: F) -> bool
    where
        H: PickerHost + ?Sized,
        F: FnOnce(PickCommit) + 'static,
    {
        if let Some(active) = &self.session {
            tracing::debug!(
                active = %active.source,
                requested = %request.source,
                "pick already in progress; ignoring start"
            );
            return false;
        }

        let PickRequest {
            source,
            cursor,
            highlight,
        } = request;

        host.set_cursor(Some(&cursor));
        host.attach_listeners();
        tracing::info!(source = %source, cursor = %cursor, highlight, "pick started");

        self.session = Some(PickerSession {
            on_commit: Some(Box::new(on_commit)),
            cursor,
            highlight,
            current_hover: None,
            source,
        });
        true
    }

    /// Route a pointer event through the active session.
    pub fn handle<H: PickerHost + ?Sized>(&mut self, host: &mut H, event: PointerEvent) -> Dispatch {
        let Some(session) = self.session.as_mut() else {
            return Dispatch::Continue;
        };

        match event {
            PointerEvent::Move { target } => {
                if host.is_tool_chrome(target) {
                    session.clear_hover(host);
                    return Dispatch::Continue;
                }
                if session.current_hover != Some(target) {
                    session.clear_hover(host);
                    session.current_hover = Some(target);
                    if session.highlight {
                        host.apply_highlight(target);
                    }
                }
                Dispatch::Continue
            }
            PointerEvent::Click { target } => {
                if host.is_tool_chrome(target) {
                    return Dispatch::Continue;
                }

                let Some(mut session) = self.session.take() else {
                    return Dispatch::Continue;
                };
                let handler = session.on_commit.take();
                let commit = PickCommit {
                    node: target,
                    source: session.source.clone(),
                };
                Self::teardown(host, session);

                tracing::info!(node = %commit.node, source = %commit.source, "pick committed");
                if let Some(handler) = handler {
                    handler(commit);
                }
                Dispatch::Consumed
            }
        }
    }

    /// End the active session without committing. Returns whether a session was stopped.
    pub fn stop<H: PickerHost + ?Sized>(&mut self, host: &mut H) -> bool {
        match self.session.take() {
            Some(session) => {
                tracing::info!(source = %session.source, "pick cancelled");
                Self::teardown(host, session);
                true
            }
            None => false,
        }
    }

    fn teardown<H: PickerHost + ?Sized>(host: &mut H, mut session: PickerSession) {
        host.detach_listeners();
        session.clear_hover(host);
        host.set_cursor(None);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingHost {
        listeners: usize,
        attach_calls: usize,
        cursor: Option<String>,
        highlighted: HashSet<NodeId>,
        chrome: HashSet<NodeId>,
    }

    impl PickerHost for RecordingHost {
        fn attach_listeners(&mut self) {
            self.listeners += 1;
            self.attach_calls += 1;
        }

        fn detach_listeners(&mut self) {
            self.listeners = self.listeners.saturating_sub(1);
        }

        fn set_cursor(&mut self, cursor: Option<&str>) {
            self.cursor = cursor.map(str::to_owned);
        }

        fn apply_highlight(&mut self, node: NodeId) {
            self.highlighted.insert(node);
        }

        fn clear_highlight(&mut self, node: NodeId) {
            self.highlighted.remove(&node);
        }

        fn is_tool_chrome(&self, node: NodeId) -> bool {
            self.chrome.contains(&node)
        }
    }

    fn node(index: usize) -> NodeId {
        NodeId::from_index(index)
    }

    fn commit_sink() -> (Rc<RefCell<Vec<PickCommit>>>, impl FnOnce(PickCommit) + 'static) {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let handle = Rc::clone(&sink);
        (sink, move |commit| handle.borrow_mut().push(commit))
    }

    #[test]
    fn start_is_idempotent() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();

        assert!(picker.start(&mut host, PickRequest::new("inspector"), |_| {}));
        assert!(!picker.start(&mut host, PickRequest::new("filters"), |_| {}));

        assert_eq!(host.attach_calls, 1);
        assert_eq!(host.listeners, 1);
        assert_eq!(
            picker.state(),
            PickerState::Active {
                source: "inspector".into()
            }
        );
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();

        assert!(!picker.stop(&mut host));
        assert_eq!(host.listeners, 0);
        assert_eq!(host.cursor, None);
        assert_eq!(picker.state(), PickerState::Idle);
    }

    #[test]
    fn hover_moves_highlight_between_targets() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();
        picker.start(&mut host, PickRequest::new("inspector"), |_| {});

        picker.handle(&mut host, PointerEvent::Move { target: node(3) });
        assert_eq!(host.highlighted, HashSet::from([node(3)]));

        picker.handle(&mut host, PointerEvent::Move { target: node(3) });
        picker.handle(&mut host, PointerEvent::Move { target: node(4) });
        assert_eq!(host.highlighted, HashSet::from([node(4)]));
        assert_eq!(picker.session().unwrap().current_hover(), Some(node(4)));
    }

    #[test]
    fn hovering_tool_chrome_clears_highlight() {
        let mut host = RecordingHost {
            chrome: HashSet::from([node(9)]),
            ..Default::default()
        };
        let mut picker = PickerController::new();
        picker.start(&mut host, PickRequest::new("inspector"), |_| {});

        picker.handle(&mut host, PointerEvent::Move { target: node(2) });
        picker.handle(&mut host, PointerEvent::Move { target: node(9) });

        assert!(host.highlighted.is_empty());
        assert_eq!(picker.session().unwrap().current_hover(), None);
    }

    #[test]
    fn disabled_highlight_tracks_hover_without_visuals() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();
        let request = PickRequest::new("colors")
            .with_cursor("copy")
            .with_highlight(false);
        picker.start(&mut host, request, |_| {});

        picker.handle(&mut host, PointerEvent::Move { target: node(5) });
        assert!(host.highlighted.is_empty());
        assert_eq!(host.cursor.as_deref(), Some("copy"));
        assert_eq!(picker.session().unwrap().current_hover(), Some(node(5)));
    }

    #[test]
    fn click_commits_once_and_tears_down() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();
        let (commits, handler) = commit_sink();
        picker.start(&mut host, PickRequest::new("filters"), handler);

        picker.handle(&mut host, PointerEvent::Move { target: node(7) });
        let dispatch = picker.handle(&mut host, PointerEvent::Click { target: node(7) });
        assert_eq!(dispatch, Dispatch::Consumed);

        let again = picker.handle(&mut host, PointerEvent::Click { target: node(8) });
        assert_eq!(again, Dispatch::Continue);

        assert_eq!(
            *commits.borrow(),
            vec![PickCommit {
                node: node(7),
                source: "filters".into()
            }]
        );
        assert!(!picker.is_active());
        assert_eq!(host.listeners, 0);
        assert!(host.highlighted.is_empty());
        assert_eq!(host.cursor, None);
    }

    #[test]
    fn clicks_on_tool_chrome_pass_through() {
        let mut host = RecordingHost {
            chrome: HashSet::from([node(1)]),
            ..Default::default()
        };
        let mut picker = PickerController::new();
        let (commits, handler) = commit_sink();
        picker.start(&mut host, PickRequest::new("inspector"), handler);

        let dispatch = picker.handle(&mut host, PointerEvent::Click { target: node(1) });
        assert_eq!(dispatch, Dispatch::Continue);
        assert!(picker.is_active());
        assert!(commits.borrow().is_empty());
    }

    #[test]
    fn stop_clears_lingering_highlight_and_cursor() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();
        let (commits, handler) = commit_sink();
        picker.start(&mut host, PickRequest::new("inspector"), handler);
        picker.handle(&mut host, PointerEvent::Move { target: node(2) });

        assert!(picker.stop(&mut host));
        assert!(host.highlighted.is_empty());
        assert_eq!(host.listeners, 0);
        assert_eq!(host.cursor, None);
        assert!(commits.borrow().is_empty());

        assert!(picker.start(&mut host, PickRequest::new("inspector"), |_| {}));
        assert_eq!(host.listeners, 1);
    }

    #[test]
    fn idle_controller_ignores_events() {
        let mut host = RecordingHost::default();
        let mut picker = PickerController::new();
        assert_eq!(
            picker.handle(&mut host, PointerEvent::Click { target: node(1) }),
            Dispatch::Continue
        );
        assert!(host.highlighted.is_empty());
    }
}
