//! The remote file tree: an arena of folder and file nodes.
//!
//! Each folder lists its own contents through the transport in a spawned task
//! and reports back with [`Event::Listing`]; mutations report back with
//! [`Event::Mutation`]. The application feeds those events into
//! [`Tree::apply_listing`] / [`Tree::apply_mutation`] on its event loop, so all
//! node state is only ever touched from one place.
//!
//! A parent owns its children by [`NodeId`]. Destroying a node destroys its
//! subtree and aborts the subtree's in-flight activations.

pub mod file;
pub mod folder;
pub mod store;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::error::FsError;
use crate::event::{Event, Mutation, MutationOutcome, MutationResult};
use crate::input::InputState;
use crate::transport::client::VfsClient;
use crate::vpath;

pub use file::{FileMode, FileState};
pub use folder::{CreateKind, FolderState};
pub use store::ExpansionStore;

/// Arena key of a live node. Never reused within a session.
pub type NodeId = u64;

/// Default delay between losing focus and a context menu closing.
pub const DEFAULT_BLUR_GRACE_MS: u64 = 160;

#[derive(Debug)]
pub enum Node {
    Folder(FolderState),
    File(FileState),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::Folder(f) => &f.path,
            Node::File(f) => &f.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Folder(f) => &f.name,
            Node::File(f) => &f.name,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Folder(f) => f.parent,
            Node::File(f) => Some(f.parent),
        }
    }

    fn menu_mut(&mut self) -> &mut ContextMenu {
        match self {
            Node::Folder(f) => &mut f.menu,
            Node::File(f) => &mut f.menu,
        }
    }

    /// The inline input currently open on this node, if any.
    pub fn input(&self) -> Option<&InlineInput> {
        match self {
            Node::Folder(f) => f.create.as_ref().map(|c| &c.input),
            Node::File(f) => f.rename.as_ref(),
        }
    }

    pub fn input_mut(&mut self) -> Option<&mut InlineInput> {
        match self {
            Node::Folder(f) => f.create.as_mut().map(|c| &mut c.input),
            Node::File(f) => f.rename.as_mut(),
        }
    }
}

/// Open/closed state of a node's context menu with debounced blur.
///
/// Losing focus does not close the menu at once; it arms a deadline so a
/// click on a menu entry still lands. Regaining focus disarms it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextMenu {
    open: bool,
    close_at: Option<Instant>,
}

impl ContextMenu {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
        self.close_at = None;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.close_at = None;
    }

    pub fn blur(&mut self, now: Instant, grace: Duration) {
        if self.open {
            self.close_at = Some(now + grace);
        }
    }

    pub fn focus(&mut self) {
        self.close_at = None;
    }

    /// Close if the blur deadline has passed. Returns whether it closed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.close_at {
            Some(deadline) if now >= deadline => {
                self.close();
                true
            }
            _ => false,
        }
    }
}

/// Text entry shown inline under a node (new name, rename target).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineInput {
    pub text: InputState,
    /// Failure of the last commit; the input stays open so it can be retried.
    pub error: Option<FsError>,
    /// Ticket of the commit awaiting its reply.
    pub pending: Option<u64>,
}

impl InlineInput {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: InputState::with_text(text),
            ..Default::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Entries of a context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    NewFile,
    NewFolder,
    Rename,
    Delete,
}

impl MenuAction {
    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::NewFile => "Create New File...",
            MenuAction::NewFolder => "Create New Folder...",
            MenuAction::Rename => "Rename",
            MenuAction::Delete => "Delete",
        }
    }

    /// Key that triggers the entry while the menu is open.
    pub fn key(&self) -> char {
        match self {
            MenuAction::NewFile => 'f',
            MenuAction::NewFolder => 'd',
            MenuAction::Rename => 'r',
            MenuAction::Delete => 'x',
        }
    }

    pub fn for_key(key: char, on_folder: bool) -> Option<Self> {
        let candidates: &[MenuAction] = if on_folder {
            &[MenuAction::NewFile, MenuAction::NewFolder]
        } else {
            &[MenuAction::Rename, MenuAction::Delete]
        };
        candidates.iter().copied().find(|action| action.key() == key)
    }
}

/// What a rendered row shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    Folder { expanded: bool },
    File,
    Menu(MenuAction),
    Input,
}

/// A flattened tree row for rendering and cursor navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub node: NodeId,
    pub kind: RowKind,
    pub name: String,
    pub path: String,
    pub depth: usize,
    pub is_last_sibling: bool,
}

/// Owner of every live node plus the collaborators nodes call into.
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: NodeId,
    next_ticket: u64,
    /// Tickets whose completion event has not been applied yet.
    outstanding: HashSet<u64>,
    client: VfsClient,
    store: ExpansionStore,
    start_path: String,
    blur_grace: Duration,
    events: mpsc::UnboundedSender<Event>,
}

impl Tree {
    /// Create the tree with a root folder at `/` and start its activation.
    pub fn new(
        client: VfsClient,
        store: ExpansionStore,
        start_path: &str,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let start_path = vpath::normalize(start_path);
        let mut tree = Self {
            nodes: HashMap::new(),
            root: 0,
            next_id: 0,
            next_ticket: 0,
            outstanding: HashSet::new(),
            client,
            store,
            start_path,
            blur_grace: Duration::from_millis(DEFAULT_BLUR_GRACE_MS),
            events,
        };
        tree.root = tree.insert_folder("/", "/", None, 0);
        tree.activate(tree.root);
        tree
    }

    pub fn with_blur_grace(mut self, grace: Duration) -> Self {
        self.blur_grace = grace;
        self
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn start_path(&self) -> &str {
        &self.start_path
    }

    pub fn store(&self) -> &ExpansionStore {
        &self.store
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn folder(&self, id: NodeId) -> Option<&FolderState> {
        match self.nodes.get(&id) {
            Some(Node::Folder(f)) => Some(f),
            _ => None,
        }
    }

    pub fn file(&self, id: NodeId) -> Option<&FileState> {
        match self.nodes.get(&id) {
            Some(Node::File(f)) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn folder_mut(&mut self, id: NodeId) -> Option<&mut FolderState> {
        match self.nodes.get_mut(&id) {
            Some(Node::Folder(f)) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn file_mut(&mut self, id: NodeId) -> Option<&mut FileState> {
        match self.nodes.get_mut(&id) {
            Some(Node::File(f)) => Some(f),
            _ => None,
        }
    }

    pub fn input_mut(&mut self, id: NodeId) -> Option<&mut InlineInput> {
        self.nodes.get_mut(&id).and_then(Node::input_mut)
    }

    /// Find a live node by path.
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.path() == path)
            .map(|(id, _)| *id)
    }

    /// Whether every spawned call has been applied.
    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    // ── Arena management ─────────────────────────────────────────────────

    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn alloc_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.outstanding.insert(self.next_ticket);
        self.next_ticket
    }

    fn insert_folder(
        &mut self,
        path: &str,
        name: &str,
        parent: Option<NodeId>,
        depth: usize,
    ) -> NodeId {
        let id = self.alloc_id();
        let expanded = self.store.initial(path, &self.start_path);
        let folder = FolderState::new(path, name, parent, depth, expanded);
        self.nodes.insert(id, Node::Folder(folder));
        id
    }

    fn insert_file(&mut self, path: &str, name: &str, parent: NodeId, depth: usize) -> NodeId {
        let id = self.alloc_id();
        self.nodes
            .insert(id, Node::File(FileState::new(path, name, parent, depth)));
        id
    }

    /// Remove `id` and its whole subtree, aborting in-flight activations.
    fn destroy(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if let Node::Folder(mut folder) = node {
            if let Some(activation) = folder.activation.take() {
                activation.abort.abort();
                self.outstanding.remove(&activation.ticket);
            }
            for (_, child) in folder.children.drain(..) {
                self.destroy(child);
            }
        }
        // Pending mutations are not aborted: the remote side may already
        // have applied them. Their results arrive for a missing node and are
        // dropped in `apply_mutation`.
    }

    // ── Focus and menus ──────────────────────────────────────────────────

    /// The node lost focus: arm its menu's auto-close.
    pub fn blur(&mut self, id: NodeId, now: Instant) {
        let grace = self.blur_grace;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.menu_mut().blur(now, grace);
        }
    }

    /// The node regained focus before its menu closed.
    pub fn focus(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.menu_mut().focus();
        }
    }

    /// Close menus whose blur deadline has passed. Returns whether any closed.
    pub fn expire_menus(&mut self, now: Instant) -> bool {
        let mut closed = false;
        for node in self.nodes.values_mut() {
            closed |= node.menu_mut().expire(now);
        }
        closed
    }

    pub fn close_menu(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.menu_mut().close();
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Issue a mutating call on behalf of `node` and return its ticket.
    fn spawn_mutation(&mut self, node: NodeId, mutation: Mutation) -> u64 {
        let ticket = self.alloc_ticket();
        let client = self.client.clone();
        let events = self.events.clone();
        tracing::debug!(node, ticket, ?mutation, "mutation issued");

        tokio::spawn(async move {
            let result = match &mutation {
                Mutation::CreateFile { path } => client.write_file(path, &[]).await,
                Mutation::CreateFolder { path } => client.mkdir(path).await,
                Mutation::Rename { from, to, .. } => client.rename(from, to).await,
                Mutation::Delete { path } => client.unlink(path).await,
            };
            let _ = events.send(Event::Mutation(MutationResult {
                node,
                ticket,
                mutation,
                outcome: result.into(),
            }));
        });
        ticket
    }

    /// Apply a mutation reply to the node that issued it.
    ///
    /// Returns the failure, if any, for the caller to surface.
    pub fn apply_mutation(&mut self, result: MutationResult) -> Option<FsError> {
        self.outstanding.remove(&result.ticket);
        let MutationResult {
            node,
            ticket,
            mutation,
            outcome,
        } = result;

        let failure = match &outcome {
            MutationOutcome::Succeeded => {
                tracing::info!(node, "{}", mutation.describe());
                None
            }
            MutationOutcome::Failed(err) => {
                tracing::warn!(node, ?mutation, error = %err, "mutation failed");
                Some(err.clone())
            }
        };

        if !self.nodes.contains_key(&node) {
            tracing::debug!(node, ticket, "mutation reply for destroyed node dropped");
            return failure;
        }

        match mutation {
            Mutation::CreateFile { .. } | Mutation::CreateFolder { .. } => {
                self.finish_create(node, ticket, outcome)
            }
            Mutation::Rename { to, new_name, .. } => {
                self.finish_rename(node, ticket, &to, &new_name, outcome)
            }
            Mutation::Delete { .. } => self.finish_delete(node, ticket, outcome),
        }
        failure
    }

    // ── Rendering ────────────────────────────────────────────────────────

    /// Flatten the visible tree into rows, depth first.
    ///
    /// Deleted files produce no rows. Menu and input rows follow the row of
    /// the node that owns them.
    pub fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        self.flatten_node(self.root, true, &mut rows);
        rows
    }

    fn flatten_node(&self, id: NodeId, is_last: bool, rows: &mut Vec<Row>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let base = |kind: RowKind, depth: usize| Row {
            node: id,
            kind,
            name: node.name().to_string(),
            path: node.path().to_string(),
            depth,
            is_last_sibling: is_last,
        };

        match node {
            Node::Folder(folder) => {
                rows.push(base(
                    RowKind::Folder {
                        expanded: folder.expanded,
                    },
                    folder.depth,
                ));
                if folder.menu.is_open() {
                    for action in [MenuAction::NewFile, MenuAction::NewFolder] {
                        rows.push(base(RowKind::Menu(action), folder.depth + 1));
                    }
                }
                if folder.create.is_some() {
                    rows.push(base(RowKind::Input, folder.depth + 1));
                }
                if folder.expanded {
                    let visible: Vec<NodeId> = folder
                        .children
                        .iter()
                        .map(|(_, child)| *child)
                        .filter(|child| !self.file(*child).is_some_and(|f| f.deleted))
                        .collect();
                    for (i, child) in visible.iter().enumerate() {
                        self.flatten_node(*child, i + 1 == visible.len(), rows);
                    }
                }
            }
            Node::File(file) => {
                if file.deleted {
                    return;
                }
                rows.push(base(RowKind::File, file.depth));
                if file.menu.is_open() {
                    for action in [MenuAction::Rename, MenuAction::Delete] {
                        rows.push(base(RowKind::Menu(action), file.depth + 1));
                    }
                }
                if file.rename.is_some() {
                    rows.push(base(RowKind::Input, file.depth + 1));
                }
            }
        }
    }
}
