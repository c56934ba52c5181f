use std::time::{Duration, Instant};

use ratatui::layout::Rect;

use crate::event::{Event, ListingResult, MutationResult};
use crate::tree::{CreateKind, MenuAction, Node, NodeId, Row, RowKind, Tree};

/// How long a status message stays in the status bar.
const STATUS_TTL: Duration = Duration::from_secs(3);

/// Application mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    #[default]
    Normal,
    /// Keys go to the inline input of this node.
    Editing(NodeId),
}

/// A message shown in place of the status bar for a few seconds.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub created: Instant,
}

/// Main application state.
pub struct App {
    pub tree: Tree,
    /// Flattened view of `tree`, rebuilt after every change.
    pub rows: Vec<Row>,
    pub selected_index: usize,
    pub scroll_offset: usize,
    pub mode: AppMode,
    pub should_quit: bool,
    pub status_message: Option<StatusMessage>,
    /// Last path a file node asked to open.
    pub last_opened: Option<String>,
    pub use_icons: bool,
    /// Inner area of the tree panel from the last draw, for mouse hits.
    pub tree_area: Rect,
    /// Path that takes the cursor once it is listed.
    pending_focus: Option<String>,
    /// Node owning the selected row; its menu blurs when this changes.
    focused: Option<NodeId>,
}

impl App {
    pub fn new(tree: Tree) -> Self {
        let pending_focus = Some(tree.start_path().to_string());
        let mut app = Self {
            tree,
            rows: Vec::new(),
            selected_index: 0,
            scroll_offset: 0,
            mode: AppMode::Normal,
            should_quit: false,
            status_message: None,
            last_opened: None,
            use_icons: true,
            tree_area: Rect::default(),
            pending_focus,
            focused: None,
        };
        app.refresh();
        app
    }

    pub fn with_icons(mut self, use_icons: bool) -> Self {
        self.use_icons = use_icons;
        self
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.rows.get(self.selected_index)
    }

    /// Rebuild rows, keeping the cursor on the same row where possible.
    pub fn refresh(&mut self) {
        let previous = self.selected_row().map(|r| (r.node, r.kind.clone()));
        self.rows = self.tree.rows();

        let mut index = previous.and_then(|(node, kind)| {
            self.rows
                .iter()
                .position(|r| r.node == node && r.kind == kind)
                .or_else(|| self.rows.iter().position(|r| r.node == node))
        });

        if let Some(target) = self.pending_focus.as_deref() {
            let found = self.tree.find_by_path(target).and_then(|id| {
                self.rows
                    .iter()
                    .position(|r| r.node == id && matches!(r.kind, RowKind::Folder { .. }))
            });
            if found.is_some() {
                index = found;
                self.pending_focus = None;
            }
        }

        let last = self.rows.len().saturating_sub(1);
        self.selected_index = index.unwrap_or(self.selected_index).min(last);

        if let AppMode::Editing(node) = self.mode {
            if self.tree.node(node).and_then(Node::input).is_none() {
                self.mode = AppMode::Normal;
            }
        }
        self.sync_focus();
    }

    /// Blur the previously focused node's menu when the cursor leaves it.
    fn sync_focus(&mut self) {
        let current = self.selected_row().map(|r| r.node);
        if current == self.focused {
            return;
        }
        if let Some(old) = self.focused {
            self.tree.blur(old, Instant::now());
        }
        if let Some(new) = current {
            self.tree.focus(new);
        }
        self.focused = current;
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Apply a non-input event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Listing(result) => self.on_listing(result),
            Event::Mutation(result) => self.on_mutation(result),
            Event::OpenFile(path) => {
                self.set_status_message(format!("Opened {path}"), false);
                self.last_opened = Some(path);
            }
            Event::Tick => self.tick(Instant::now()),
            Event::Key(_) | Event::Mouse(_) | Event::Resize(..) => {}
        }
    }

    fn on_listing(&mut self, result: ListingResult) {
        let path = self
            .tree
            .node(result.node)
            .map(|n| n.path().to_string())
            .unwrap_or_default();
        if let Some(err) = self.tree.apply_listing(result) {
            self.set_status_message(format!("Listing {path} failed: {err}"), true);
        }
        self.refresh();
    }

    fn on_mutation(&mut self, result: MutationResult) {
        let description = result.mutation.describe();
        match self.tree.apply_mutation(result) {
            Some(err) => self.set_status_message(err.to_string(), true),
            None => self.set_status_message(description, false),
        }
        self.refresh();
    }

    pub fn tick(&mut self, now: Instant) {
        if self.tree.expire_menus(now) {
            self.refresh();
        }
        self.clear_expired_status(now);
    }

    pub fn set_status_message(&mut self, text: String, is_error: bool) {
        self.status_message = Some(StatusMessage {
            text,
            is_error,
            created: Instant::now(),
        });
    }

    pub fn clear_expired_status(&mut self, now: Instant) {
        if let Some(msg) = &self.status_message {
            if now.duration_since(msg.created) >= STATUS_TTL {
                self.status_message = None;
            }
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    // ── Navigation ───────────────────────────────────────────────────────

    pub fn select(&mut self, index: usize) {
        if index < self.rows.len() {
            self.selected_index = index;
            self.sync_focus();
        }
    }

    pub fn select_next(&mut self) {
        self.select(self.selected_index + 1);
    }

    pub fn select_previous(&mut self) {
        if let Some(index) = self.selected_index.checked_sub(1) {
            self.select(index);
        }
    }

    pub fn select_first(&mut self) {
        self.select(0);
    }

    pub fn select_last(&mut self) {
        self.select(self.rows.len().saturating_sub(1));
    }

    fn select_node(&mut self, node: NodeId) {
        if let Some(index) = self
            .rows
            .iter()
            .position(|r| r.node == node && matches!(r.kind, RowKind::Folder { .. } | RowKind::File))
        {
            self.select(index);
        }
    }

    /// Keep the selected row inside a viewport of `visible_height` rows.
    pub fn update_scroll(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + visible_height {
            self.scroll_offset = self.selected_index + 1 - visible_height;
        }
    }

    /// Row index under a terminal cell, if it hits a row of the tree panel.
    pub fn row_at(&self, column: u16, row: u16) -> Option<usize> {
        let area = self.tree_area;
        if column < area.x
            || column >= area.x + area.width
            || row < area.y
            || row >= area.y + area.height
        {
            return None;
        }
        let index = self.scroll_offset + (row - area.y) as usize;
        (index < self.rows.len()).then_some(index)
    }

    // ── Actions on the selected row ──────────────────────────────────────

    /// Toggle a folder, open a file, run a menu entry or focus an input.
    pub fn activate_selected(&mut self) {
        let Some(row) = self.selected_row().cloned() else {
            return;
        };
        match row.kind {
            RowKind::Folder { .. } => self.tree.toggle_expansion(row.node),
            RowKind::File => self.tree.open_file(row.node),
            RowKind::Menu(action) => self.run_menu_action(row.node, action),
            RowKind::Input => self.mode = AppMode::Editing(row.node),
        }
        self.refresh();
    }

    /// Collapse an expanded folder, otherwise move to the parent folder.
    pub fn collapse_selected(&mut self) {
        let Some(row) = self.selected_row().cloned() else {
            return;
        };
        if let RowKind::Folder { expanded: true } = row.kind {
            self.tree.toggle_expansion(row.node);
            self.refresh();
            return;
        }
        let parent = match row.kind {
            RowKind::Folder { .. } | RowKind::File => self.tree.node(row.node).and_then(Node::parent),
            // Inline rows belong to the node above them.
            RowKind::Menu(_) | RowKind::Input => Some(row.node),
        };
        if let Some(parent) = parent {
            self.select_node(parent);
        }
    }

    /// Open the context menu of the node owning the selected row.
    pub fn open_menu(&mut self) {
        let Some(node) = self.selected_row().map(|r| r.node) else {
            return;
        };
        match self.tree.node(node) {
            Some(Node::Folder(_)) => self.tree.request_folder_menu(node),
            Some(Node::File(_)) => self.tree.request_file_menu(node),
            None => return,
        }
        self.refresh();
    }

    /// Trigger a menu entry by its key. Returns whether a menu consumed it.
    pub fn menu_key(&mut self, key: char) -> bool {
        let Some(node) = self.selected_row().map(|r| r.node) else {
            return false;
        };
        let (is_open, on_folder) = match self.tree.node(node) {
            Some(Node::Folder(f)) => (f.menu.is_open(), true),
            Some(Node::File(f)) => (f.menu.is_open(), false),
            None => return false,
        };
        if !is_open {
            return false;
        }
        match MenuAction::for_key(key, on_folder) {
            Some(action) => {
                self.run_menu_action(node, action);
                self.refresh();
                true
            }
            None => false,
        }
    }

    /// Close the menu of the node owning the selected row, if open.
    pub fn close_menu(&mut self) -> bool {
        let Some(node) = self.selected_row().map(|r| r.node) else {
            return false;
        };
        let was_open = match self.tree.node(node) {
            Some(Node::Folder(f)) => f.menu.is_open(),
            Some(Node::File(f)) => f.menu.is_open(),
            None => false,
        };
        if was_open {
            self.tree.close_menu(node);
            self.refresh();
        }
        was_open
    }

    fn run_menu_action(&mut self, node: NodeId, action: MenuAction) {
        match action {
            MenuAction::NewFile => self.begin_edit(node, |t, n| t.begin_create(n, CreateKind::File)),
            MenuAction::NewFolder => {
                self.begin_edit(node, |t, n| t.begin_create(n, CreateKind::Folder))
            }
            MenuAction::Rename => self.begin_edit(node, Tree::begin_rename),
            MenuAction::Delete => {
                self.tree.close_menu(node);
                self.tree.delete_file(node);
            }
        }
    }

    fn begin_edit(&mut self, node: NodeId, open: impl FnOnce(&mut Tree, NodeId)) {
        open(&mut self.tree, node);
        if self.tree.node(node).and_then(Node::input).is_some() {
            self.mode = AppMode::Editing(node);
            self.rows = self.tree.rows();
            if let Some(index) = self
                .rows
                .iter()
                .position(|r| r.node == node && r.kind == RowKind::Input)
            {
                self.selected_index = index;
            }
        }
    }

    // ── Inline input ─────────────────────────────────────────────────────

    /// Edit the active inline input. Ignored while its commit is pending.
    pub fn edit_input(&mut self, edit: impl FnOnce(&mut crate::input::InputState)) {
        let AppMode::Editing(node) = self.mode else {
            return;
        };
        if let Some(input) = self.tree.input_mut(node).filter(|i| !i.is_pending()) {
            edit(&mut input.text);
            input.error = None;
        }
    }

    pub fn commit_input(&mut self) {
        let AppMode::Editing(node) = self.mode else {
            return;
        };
        match self.tree.node(node) {
            Some(Node::Folder(_)) => self.tree.commit_create(node),
            Some(Node::File(_)) => self.tree.commit_rename(node),
            None => {}
        }
        self.refresh();
    }

    pub fn cancel_input(&mut self) {
        let AppMode::Editing(node) = self.mode else {
            return;
        };
        match self.tree.node(node) {
            Some(Node::Folder(_)) => self.tree.cancel_create(node),
            Some(Node::File(_)) => self.tree.cancel_rename(node),
            None => {}
        }
        self.mode = AppMode::Normal;
        self.refresh();
        self.select_node(node);
    }
}
