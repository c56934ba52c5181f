use futures::future::try_join_all;
use tokio::task::AbortHandle;

use super::{ContextMenu, InlineInput, Node, NodeId, Tree};
use crate::error::{FsError, FsErrorKind};
use crate::event::{Event, Listing, ListingResult, Mutation, MutationOutcome};
use crate::transport::client::VfsClient;
use crate::vpath;

/// Which inline creation flow is open on a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInput {
    pub kind: CreateKind,
    pub input: InlineInput,
}

/// The in-flight listing of a folder.
#[derive(Debug)]
pub(crate) struct Activation {
    pub(crate) ticket: u64,
    pub(crate) abort: AbortHandle,
}

/// Key of a rendered child: its name and whether it is a folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildKey {
    pub name: String,
    pub is_folder: bool,
}

/// State of one directory node.
#[derive(Debug)]
pub struct FolderState {
    /// Fixed for the node's lifetime.
    pub path: String,
    pub name: String,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub expanded: bool,
    pub child_dirs: Vec<String>,
    pub child_files: Vec<String>,
    /// Rendered children, folders first, in listing order.
    pub children: Vec<(ChildKey, NodeId)>,
    pub menu: ContextMenu,
    pub create: Option<CreateInput>,
    /// Failure of the most recent activation, cleared by the next success.
    pub last_error: Option<FsError>,
    pub(crate) activation: Option<Activation>,
}

impl FolderState {
    pub fn new(
        path: &str,
        name: &str,
        parent: Option<NodeId>,
        depth: usize,
        expanded: bool,
    ) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            parent,
            depth,
            expanded,
            child_dirs: Vec::new(),
            child_files: Vec::new(),
            children: Vec::new(),
            menu: ContextMenu::default(),
            create: None,
            last_error: None,
            activation: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.activation.is_some()
    }
}

/// List `path` and classify every entry.
///
/// All `analyzePath` calls are issued together and joined before anything is
/// partitioned, so a caller never sees a half-classified listing. Any failed
/// call fails the whole listing.
pub async fn list_folder(client: &VfsClient, path: &str) -> Result<Listing, FsError> {
    let entries: Vec<String> = client
        .readdir(path)
        .await?
        .into_iter()
        .filter(|name| name != "." && name != "..")
        .collect();

    let infos = try_join_all(entries.iter().map(|name| {
        let child = vpath::join(path, name);
        async move { client.analyze_path(&child).await }
    }))
    .await?;

    let mut listing = Listing::default();
    for (name, info) in entries.into_iter().zip(infos) {
        if !info.exists {
            return Err(FsError::new(
                FsErrorKind::NotFound,
                format!("{} vanished while listing", info.path),
            ));
        }
        if info.is_folder {
            listing.dirs.push(name);
        } else {
            listing.files.push(name);
        }
    }
    Ok(listing)
}

impl Tree {
    /// Start (or restart) listing a folder's contents.
    ///
    /// No-op on a collapsed folder. A previous activation still in flight is
    /// aborted and its reply will be ignored.
    pub fn activate(&mut self, id: NodeId) {
        let Some(folder) = self.folder(id) else {
            return;
        };
        if !folder.expanded {
            return;
        }
        let path = folder.path.clone();
        self.cancel_activation(id);

        let ticket = self.alloc_ticket();
        let client = self.client.clone();
        let events = self.events.clone();
        tracing::debug!(node = id, ticket, %path, "activation started");

        let handle = tokio::spawn(async move {
            let outcome = list_folder(&client, &path).await;
            let _ = events.send(Event::Listing(ListingResult {
                node: id,
                ticket,
                outcome,
            }));
        });

        if let Some(folder) = self.folder_mut(id) {
            folder.activation = Some(Activation {
                ticket,
                abort: handle.abort_handle(),
            });
        }
    }

    fn cancel_activation(&mut self, id: NodeId) {
        if let Some(activation) = self.folder_mut(id).and_then(|f| f.activation.take()) {
            activation.abort.abort();
            self.outstanding.remove(&activation.ticket);
        }
    }

    /// Publish a finished activation.
    ///
    /// Results for destroyed nodes, superseded tickets, or folders collapsed
    /// in the meantime are discarded. A failure keeps the previous listing.
    pub fn apply_listing(&mut self, result: ListingResult) -> Option<FsError> {
        self.outstanding.remove(&result.ticket);
        let Some(folder) = self.folder_mut(result.node) else {
            tracing::debug!(node = result.node, "listing for destroyed node dropped");
            return None;
        };
        if folder.activation.as_ref().map(|a| a.ticket) != Some(result.ticket) {
            tracing::debug!(node = result.node, ticket = result.ticket, "stale listing dropped");
            return None;
        }
        folder.activation = None;
        if !folder.expanded {
            return None;
        }

        match result.outcome {
            Ok(listing) => {
                tracing::debug!(
                    path = %folder.path,
                    dirs = listing.dirs.len(),
                    files = listing.files.len(),
                    "listing applied"
                );
                folder.last_error = None;
                folder.child_dirs = listing.dirs;
                folder.child_files = listing.files;
                self.reconcile_children(result.node);
                None
            }
            Err(err) => {
                tracing::warn!(path = %folder.path, error = %err, "listing failed");
                folder.last_error = Some(err.clone());
                Some(err)
            }
        }
    }

    /// Make the rendered children match `child_dirs` then `child_files`.
    ///
    /// A previous child is kept, with all its local state, only while its
    /// current name and kind are still listed and it is not deleted. Renamed
    /// files are matched under their new name. Everything else is destroyed
    /// and listed entries without a match get fresh nodes.
    fn reconcile_children(&mut self, id: NodeId) {
        let Some(folder) = self.folder_mut(id) else {
            return;
        };
        let path = folder.path.clone();
        let depth = folder.depth + 1;
        let wanted: Vec<ChildKey> = folder
            .child_dirs
            .iter()
            .map(|name| ChildKey {
                name: name.clone(),
                is_folder: true,
            })
            .chain(folder.child_files.iter().map(|name| ChildKey {
                name: name.clone(),
                is_folder: false,
            }))
            .collect();
        let old_children = std::mem::take(&mut folder.children);

        let mut previous: Vec<(ChildKey, NodeId)> = Vec::with_capacity(old_children.len());
        let mut stale = Vec::new();
        for (_, child) in old_children {
            match self.nodes.get(&child) {
                Some(Node::Folder(f)) => previous.push((
                    ChildKey {
                        name: f.name.clone(),
                        is_folder: true,
                    },
                    child,
                )),
                Some(Node::File(f)) if !f.deleted => previous.push((
                    ChildKey {
                        name: f.name.clone(),
                        is_folder: false,
                    },
                    child,
                )),
                _ => stale.push(child),
            }
        }

        let mut children = Vec::with_capacity(wanted.len());
        let mut fresh_folders = Vec::new();
        for key in wanted {
            if let Some(pos) = previous.iter().position(|(k, _)| *k == key) {
                let (_, child) = previous.swap_remove(pos);
                children.push((key, child));
                continue;
            }
            let child_path = vpath::join(&path, &key.name);
            let child = if key.is_folder {
                let child = self.insert_folder(&child_path, &key.name, Some(id), depth);
                fresh_folders.push(child);
                child
            } else {
                self.insert_file(&child_path, &key.name, id, depth)
            };
            children.push((key, child));
        }

        stale.extend(previous.into_iter().map(|(_, child)| child));
        for child in stale {
            self.destroy(child);
        }
        if let Some(folder) = self.folder_mut(id) {
            folder.children = children;
        }
        for child in fresh_folders {
            self.activate(child);
        }
    }

    /// Flip expansion, remember it, and list or drop the contents.
    pub fn toggle_expansion(&mut self, id: NodeId) {
        let Some(folder) = self.folder_mut(id) else {
            return;
        };
        folder.expanded = !folder.expanded;
        let expanded = folder.expanded;
        let path = folder.path.clone();
        self.store.set(&path, expanded);
        tracing::debug!(%path, expanded, remembered = self.store.len(), "expansion toggled");

        if expanded {
            self.activate(id);
        } else {
            self.collapse(id);
        }
    }

    /// Drop a collapsed folder's listing and child nodes.
    fn collapse(&mut self, id: NodeId) {
        self.cancel_activation(id);
        let Some(folder) = self.folder_mut(id) else {
            return;
        };
        folder.child_dirs.clear();
        folder.child_files.clear();
        let children = std::mem::take(&mut folder.children);
        for (_, child) in children {
            self.destroy(child);
        }
    }

    /// Open the folder's context menu.
    ///
    /// The folder is expanded first (without recording it in the store) and
    /// any open creation input is discarded.
    pub fn request_folder_menu(&mut self, id: NodeId) {
        let Some(folder) = self.folder_mut(id) else {
            return;
        };
        let was_expanded = folder.expanded;
        folder.expanded = true;
        folder.create = None;
        folder.menu.open();
        if !was_expanded {
            self.activate(id);
        }
    }

    /// Open the inline input for a new file or folder.
    pub fn begin_create(&mut self, id: NodeId, kind: CreateKind) {
        if let Some(folder) = self.folder_mut(id) {
            folder.menu.close();
            folder.create = Some(CreateInput {
                kind,
                input: InlineInput::default(),
            });
        }
    }

    /// Submit the creation input.
    ///
    /// The input stays open until the service answers: success closes it and
    /// reloads the folder, failure leaves it open with the error attached.
    pub fn commit_create(&mut self, id: NodeId) {
        let Some(folder) = self.folder_mut(id) else {
            return;
        };
        let path = folder.path.clone();
        let Some(create) = folder.create.as_mut() else {
            return;
        };
        if create.input.is_pending() {
            return;
        }
        let name = create.input.text.value().to_string();
        if !vpath::is_valid_name(&name) {
            create.input.error = Some(FsError::invalid(format!("`{name}` is not a valid name")));
            return;
        }

        let target = vpath::join(&path, &name);
        let mutation = match create.kind {
            CreateKind::File => Mutation::CreateFile { path: target },
            CreateKind::Folder => Mutation::CreateFolder { path: target },
        };
        let ticket = self.spawn_mutation(id, mutation);
        if let Some(create) = self.folder_mut(id).and_then(|f| f.create.as_mut()) {
            create.input.error = None;
            create.input.pending = Some(ticket);
        }
    }

    /// Discard the creation input without calling the service.
    pub fn cancel_create(&mut self, id: NodeId) {
        if let Some(folder) = self.folder_mut(id) {
            folder.create = None;
        }
    }

    pub(super) fn finish_create(&mut self, id: NodeId, ticket: u64, outcome: MutationOutcome) {
        let Some(folder) = self.folder_mut(id) else {
            return;
        };
        let owns_input = folder
            .create
            .as_ref()
            .is_some_and(|c| c.input.pending == Some(ticket));

        match outcome {
            MutationOutcome::Succeeded => {
                if owns_input {
                    folder.create = None;
                }
                self.activate(id);
            }
            MutationOutcome::Failed(err) => {
                if let Some(create) = folder.create.as_mut().filter(|_| owns_input) {
                    create.input.pending = None;
                    create.input.error = Some(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::transport::memory::MemoryBackend;
    use crate::transport::service::serve;
    use crate::transport::{Channel, Request};
    use crate::tree::test_support::Harness;
    use crate::tree::ExpansionStore;

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_dir("/docs")
            .with_file("/docs/a.txt", b"")
            .with_file("/readme.txt", b"hello")
    }

    fn client_for(backend: MemoryBackend) -> VfsClient {
        let (channel, inbox) = Channel::pair();
        tokio::spawn(serve(backend, inbox));
        VfsClient::new(channel)
    }

    #[tokio::test]
    async fn list_folder_partitions_entries() {
        let client = client_for(backend());
        let listing = list_folder(&client, "/").await.unwrap();
        assert_eq!(listing.dirs, vec!["docs"]);
        assert_eq!(listing.files, vec!["readme.txt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn partition_is_independent_of_reply_order() {
        let names = ["d1", "f1", "d2", "f2", "d3", "f3"];
        let mut expected = Listing::default();
        let mut seeded = MemoryBackend::new();
        for name in names {
            let path = format!("/{name}");
            if name.starts_with('d') {
                seeded = seeded.with_dir(&path);
                expected.dirs.push(name.to_string());
            } else {
                seeded = seeded.with_file(&path, b"");
                expected.files.push(name.to_string());
            }
        }

        // Later entries answer first, then the reverse, then interleaved.
        let orders: [fn(usize) -> u64; 3] = [
            |i| 60 - 10 * i as u64,
            |i| 10 * i as u64,
            |i| if i % 2 == 0 { 50 } else { 5 },
        ];
        for order in orders {
            let latency = Arc::new(move |req: &Request| {
                let idx = req
                    .str_arg(0)
                    .ok()
                    .and_then(|p| names.iter().position(|n| p == format!("/{n}")))
                    .unwrap_or(0);
                Duration::from_millis(order(idx))
            });
            let client = client_for(seeded.clone().with_latency(latency));
            let listing = list_folder(&client, "/").await.unwrap();
            assert_eq!(listing, expected);
            assert!(listing.dirs.iter().all(|d| !listing.files.contains(d)));
        }
    }

    #[tokio::test]
    async fn list_folder_fails_on_missing_directory() {
        let client = client_for(backend());
        let err = list_folder(&client, "/nope").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::NotFound);
    }

    #[tokio::test]
    async fn list_empty_folder() {
        let client = client_for(MemoryBackend::new().with_dir("/empty"));
        let listing = list_folder(&client, "/empty").await.unwrap();
        assert_eq!(listing, Listing::default());
    }

    #[tokio::test]
    async fn root_activation_classifies_children() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let root = h.tree.folder(h.tree.root()).unwrap();
        assert_eq!(root.child_dirs, vec!["docs"]);
        assert_eq!(root.child_files, vec!["readme.txt"]);
        assert_eq!(root.children.len(), 2);
    }

    #[tokio::test]
    async fn folders_outside_start_path_start_collapsed() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let docs = h.tree.folder(h.id("/docs")).unwrap();
        assert!(!docs.expanded);
        assert!(docs.child_files.is_empty());
        assert!(h.tree.find_by_path("/docs/a.txt").is_none());
    }

    #[tokio::test]
    async fn start_path_ancestors_start_expanded() {
        let mut h = Harness::new(backend(), "/docs");
        h.settle().await;
        let docs = h.tree.folder(h.id("/docs")).unwrap();
        assert!(docs.expanded);
        assert_eq!(docs.child_files, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn toggle_twice_restores_and_store_tracks_last() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let docs = h.id("/docs");
        let original = h.tree.folder(docs).unwrap().expanded;

        h.tree.toggle_expansion(docs);
        h.settle().await;
        assert_eq!(h.tree.store().get("/docs"), Some(!original));
        assert_eq!(h.tree.folder(docs).unwrap().child_files, vec!["a.txt"]);

        h.tree.toggle_expansion(docs);
        h.settle().await;
        assert_eq!(h.tree.folder(docs).unwrap().expanded, original);
        assert_eq!(h.tree.store().get("/docs"), Some(original));
        assert!(h.tree.folder(docs).unwrap().child_files.is_empty());
    }

    #[tokio::test]
    async fn store_outlives_nodes() {
        let store = ExpansionStore::new();
        {
            let mut h = Harness::with_store(backend(), "/", store.clone());
            h.settle().await;
            let docs = h.id("/docs");
            h.tree.toggle_expansion(docs);
            h.settle().await;
        }
        let mut h = Harness::with_store(backend(), "/", store);
        h.settle().await;
        let docs = h.tree.folder(h.id("/docs")).unwrap();
        assert!(docs.expanded);
        assert_eq!(docs.child_files, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn reactivation_is_idempotent() {
        let mut h = Harness::new(backend(), "/docs");
        h.settle().await;
        let root = h.tree.root();
        let before = h.tree.folder(root).unwrap().children.clone();
        let dirs = h.tree.folder(root).unwrap().child_dirs.clone();
        let files = h.tree.folder(root).unwrap().child_files.clone();

        h.tree.activate(root);
        h.settle().await;
        let after = h.tree.folder(root).unwrap();
        assert_eq!(after.child_dirs, dirs);
        assert_eq!(after.child_files, files);
        // Same keys map to the same nodes.
        assert_eq!(after.children, before);
    }

    #[tokio::test]
    async fn newer_activation_supersedes_older() {
        let mut h = Harness::new(backend(), "/");
        let root = h.tree.root();
        h.tree.activate(root);
        h.tree.activate(root);
        h.settle().await;
        assert!(h.tree.is_idle());
        assert_eq!(h.tree.folder(root).unwrap().child_dirs, vec!["docs"]);
    }

    #[tokio::test]
    async fn stale_ticket_is_discarded() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let root = h.tree.root();
        let stale = ListingResult {
            node: root,
            ticket: 9_999,
            outcome: Ok(Listing {
                dirs: vec!["bogus".into()],
                files: vec![],
            }),
        };
        assert!(h.tree.apply_listing(stale).is_none());
        assert_eq!(h.tree.folder(root).unwrap().child_dirs, vec!["docs"]);
    }

    #[tokio::test]
    async fn failed_listing_keeps_previous_contents() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/");
        h.settle().await;
        let root = h.tree.root();
        let ticket = h.tree.next_ticket + 1;
        h.tree.activate(root);
        // Replace the pending result with a failure carrying the live ticket.
        let failure = ListingResult {
            node: root,
            ticket,
            outcome: Err(FsError::transport("link down")),
        };
        let err = h.tree.apply_listing(failure).unwrap();
        assert_eq!(err.kind, FsErrorKind::Transport);
        let folder = h.tree.folder(root).unwrap();
        assert_eq!(folder.child_files, vec!["readme.txt"]);
        assert!(folder.last_error.is_some());
        assert!(!folder.is_loading());
    }

    #[tokio::test]
    async fn empty_folder_renders_no_children() {
        let mut h = Harness::new(MemoryBackend::new().with_dir("/empty"), "/empty");
        h.settle().await;
        let empty = h.tree.folder(h.id("/empty")).unwrap();
        assert!(empty.expanded);
        assert!(empty.children.is_empty());
        assert!(empty.last_error.is_none());
    }

    #[tokio::test]
    async fn context_menu_forces_expansion_without_store_write() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let docs = h.id("/docs");
        h.tree.request_folder_menu(docs);
        h.settle().await;
        let folder = h.tree.folder(docs).unwrap();
        assert!(folder.expanded);
        assert!(folder.menu.is_open());
        assert_eq!(folder.child_files, vec!["a.txt"]);
        assert_eq!(h.tree.store().get("/docs"), None);
    }

    #[tokio::test]
    async fn context_menu_closes_open_create_input() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let root = h.tree.root();
        h.tree.begin_create(root, CreateKind::File);
        h.tree.request_folder_menu(root);
        let folder = h.tree.folder(root).unwrap();
        assert!(folder.create.is_none());
        assert!(folder.menu.is_open());
    }

    #[tokio::test]
    async fn create_file_then_reload_lists_it_once() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/");
        h.settle().await;
        let root = h.tree.root();

        h.tree.request_folder_menu(root);
        h.tree.begin_create(root, CreateKind::File);
        assert!(!h.tree.folder(root).unwrap().menu.is_open());
        for c in "new.txt".chars() {
            h.tree.input_mut(root).unwrap().text.insert_char(c);
        }
        h.tree.commit_create(root);
        h.settle().await;

        assert_eq!(backend.read("/new.txt"), Some(Vec::new()));
        let folder = h.tree.folder(root).unwrap();
        assert!(folder.create.is_none());
        let count = folder.child_files.iter().filter(|n| *n == "new.txt").count();
        assert_eq!(count, 1);

        h.tree.activate(root);
        h.settle().await;
        let folder = h.tree.folder(root).unwrap();
        let count = folder.child_files.iter().filter(|n| *n == "new.txt").count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn create_folder_joins_without_double_separator() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/");
        h.settle().await;
        let root = h.tree.root();
        h.tree.begin_create(root, CreateKind::Folder);
        h.tree.input_mut(root).unwrap().text = crate::input::InputState::with_text("src");
        h.tree.commit_create(root);
        h.settle().await;

        assert!(backend.is_dir("/src"));
        assert!(h.tree.find_by_path("/src").is_some());
        assert!(h.tree.find_by_path("//src").is_none());
    }

    #[tokio::test]
    async fn failed_create_keeps_input_open() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/");
        h.settle().await;
        let root = h.tree.root();
        h.tree.begin_create(root, CreateKind::Folder);
        h.tree.input_mut(root).unwrap().text = crate::input::InputState::with_text("docs");
        h.tree.commit_create(root);
        h.settle().await;

        let create = h.tree.folder(root).unwrap().create.as_ref().unwrap();
        assert_eq!(create.input.text.input, "docs");
        assert_eq!(
            create.input.error.as_ref().unwrap().kind,
            FsErrorKind::AlreadyExists
        );
        assert!(!create.input.is_pending());
    }

    #[tokio::test]
    async fn invalid_name_is_rejected_locally() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let root = h.tree.root();
        h.tree.begin_create(root, CreateKind::File);
        h.tree.commit_create(root);
        assert!(h.tree.is_idle());
        let create = h.tree.folder(root).unwrap().create.as_ref().unwrap();
        assert_eq!(
            create.input.error.as_ref().unwrap().kind,
            FsErrorKind::InvalidRequest
        );
    }

    #[tokio::test]
    async fn cancel_create_makes_no_call() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/");
        h.settle().await;
        let root = h.tree.root();
        h.tree.begin_create(root, CreateKind::File);
        h.tree.input_mut(root).unwrap().text = crate::input::InputState::with_text("x.txt");
        h.tree.cancel_create(root);
        assert!(h.tree.is_idle());
        assert!(h.tree.folder(root).unwrap().create.is_none());
        assert!(!backend.exists("/x.txt"));
    }

    #[tokio::test]
    async fn opening_one_create_input_replaces_the_other() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let root = h.tree.root();
        h.tree.begin_create(root, CreateKind::File);
        h.tree.begin_create(root, CreateKind::Folder);
        let create = h.tree.folder(root).unwrap().create.as_ref().unwrap();
        assert_eq!(create.kind, CreateKind::Folder);
    }
}
