use super::{ContextMenu, InlineInput, NodeId, Tree};
use crate::error::FsError;
use crate::event::{Event, Mutation, MutationOutcome};
use crate::vpath;

/// What a file row is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Normal,
    ContextMenuOpen,
    RenameOpen,
    /// Removed remotely; renders nothing until the parent reloads.
    Deleted,
}

/// State of one file node.
#[derive(Debug)]
pub struct FileState {
    /// Updated in place by a successful rename.
    pub path: String,
    pub name: String,
    pub parent: NodeId,
    pub depth: usize,
    pub deleted: bool,
    pub menu: ContextMenu,
    pub rename: Option<InlineInput>,
    pub(crate) pending_delete: Option<u64>,
}

impl FileState {
    pub fn new(path: &str, name: &str, parent: NodeId, depth: usize) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            parent,
            depth,
            deleted: false,
            menu: ContextMenu::default(),
            rename: None,
            pending_delete: None,
        }
    }

    pub fn mode(&self) -> FileMode {
        if self.deleted {
            FileMode::Deleted
        } else if self.rename.is_some() {
            FileMode::RenameOpen
        } else if self.menu.is_open() {
            FileMode::ContextMenuOpen
        } else {
            FileMode::Normal
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.pending_delete.is_some()
    }
}

impl Tree {
    /// Ask the host to open the file.
    pub fn open_file(&mut self, id: NodeId) {
        let Some(file) = self.file(id).filter(|f| !f.deleted) else {
            return;
        };
        tracing::debug!(path = %file.path, "open requested");
        let _ = self.events.send(Event::OpenFile(file.path.clone()));
    }

    /// Open the file's context menu. Ignored while a rename is being typed.
    pub fn request_file_menu(&mut self, id: NodeId) {
        if let Some(file) = self.file_mut(id) {
            if file.rename.is_none() && !file.deleted {
                file.menu.open();
            }
        }
    }

    /// Close the menu and open the rename input prefilled with the name.
    pub fn begin_rename(&mut self, id: NodeId) {
        if let Some(file) = self.file_mut(id).filter(|f| !f.deleted) {
            file.menu.close();
            file.rename = Some(InlineInput::with_text(&file.name));
        }
    }

    /// Submit the rename input.
    ///
    /// Keeping the current name closes the input without a remote call.
    pub fn commit_rename(&mut self, id: NodeId) {
        let Some(file) = self.file_mut(id) else {
            return;
        };
        let (path, old_name) = (file.path.clone(), file.name.clone());
        let Some(input) = file.rename.as_mut() else {
            return;
        };
        if input.is_pending() {
            return;
        }
        let new_name = input.text.value().to_string();
        if new_name == old_name {
            file.rename = None;
            return;
        }
        if !vpath::is_valid_name(&new_name) {
            input.error = Some(FsError::invalid(format!("`{new_name}` is not a valid name")));
            return;
        }

        let to = vpath::with_name(&path, &old_name, &new_name);
        let ticket = self.spawn_mutation(
            id,
            Mutation::Rename {
                from: path,
                to,
                new_name,
            },
        );
        if let Some(input) = self.file_mut(id).and_then(|f| f.rename.as_mut()) {
            input.error = None;
            input.pending = Some(ticket);
        }
    }

    pub fn cancel_rename(&mut self, id: NodeId) {
        if let Some(file) = self.file_mut(id) {
            file.rename = None;
        }
    }

    /// Ask the service to remove the file. There is no confirmation step.
    pub fn delete_file(&mut self, id: NodeId) {
        let Some(file) = self.file(id) else {
            return;
        };
        if file.deleted || file.is_deleting() {
            return;
        }
        let path = file.path.clone();
        let ticket = self.spawn_mutation(id, Mutation::Delete { path });
        if let Some(file) = self.file_mut(id) {
            file.pending_delete = Some(ticket);
        }
    }

    pub(super) fn finish_rename(
        &mut self,
        id: NodeId,
        ticket: u64,
        to: &str,
        new_name: &str,
        outcome: MutationOutcome,
    ) {
        let Some(file) = self.file_mut(id) else {
            return;
        };
        let owns_input = file
            .rename
            .as_ref()
            .is_some_and(|input| input.pending == Some(ticket));

        match outcome {
            MutationOutcome::Succeeded => {
                // The parent's listing still carries the old name until it
                // is reloaded.
                file.path = to.to_string();
                file.name = new_name.to_string();
                if owns_input {
                    file.rename = None;
                }
            }
            MutationOutcome::Failed(err) => {
                if let Some(input) = file.rename.as_mut().filter(|_| owns_input) {
                    input.pending = None;
                    input.error = Some(err);
                }
            }
        }
    }

    pub(super) fn finish_delete(&mut self, id: NodeId, ticket: u64, outcome: MutationOutcome) {
        let Some(file) = self.file_mut(id) else {
            return;
        };
        if file.pending_delete == Some(ticket) {
            file.pending_delete = None;
        }
        if outcome == MutationOutcome::Succeeded {
            file.menu.close();
            file.rename = None;
            file.deleted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsErrorKind;
    use crate::input::InputState;
    use crate::transport::memory::MemoryBackend;
    use crate::transport::service::Backend;
    use crate::tree::test_support::Harness;
    use crate::tree::CreateKind;

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_dir("/docs")
            .with_file("/docs/a.txt", b"")
            .with_file("/docs/b.txt", b"")
            .with_file("/readme.txt", b"hello")
    }

    #[tokio::test]
    async fn state_machine_transitions() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let id = h.id("/readme.txt");
        assert_eq!(h.tree.file(id).unwrap().mode(), FileMode::Normal);

        h.tree.request_file_menu(id);
        assert_eq!(h.tree.file(id).unwrap().mode(), FileMode::ContextMenuOpen);

        h.tree.begin_rename(id);
        let file = h.tree.file(id).unwrap();
        assert_eq!(file.mode(), FileMode::RenameOpen);
        assert!(!file.menu.is_open());
        assert_eq!(file.rename.as_ref().unwrap().text.input, "readme.txt");

        // A menu request while renaming is ignored.
        h.tree.request_file_menu(id);
        assert_eq!(h.tree.file(id).unwrap().mode(), FileMode::RenameOpen);

        h.tree.cancel_rename(id);
        assert_eq!(h.tree.file(id).unwrap().mode(), FileMode::Normal);
        assert!(h.tree.is_idle());
    }

    #[tokio::test]
    async fn open_emits_host_event() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let id = h.id("/readme.txt");
        h.tree.open_file(id);
        h.settle().await;
        assert!(matches!(
            h.emitted.as_slice(),
            [Event::OpenFile(path)] if path == "/readme.txt"
        ));
    }

    #[tokio::test]
    async fn delete_hides_file_without_parent_reload() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/docs");
        h.settle().await;
        let docs = h.id("/docs");
        let file = h.id("/docs/a.txt");

        h.tree.request_file_menu(file);
        h.tree.delete_file(file);
        h.settle().await;

        assert!(!backend.exists("/docs/a.txt"));
        let state = h.tree.file(file).unwrap();
        assert_eq!(state.mode(), FileMode::Deleted);
        assert!(!state.menu.is_open());
        assert!(!h.visible_paths().contains(&"/docs/a.txt".to_string()));
        // Parent listing is stale until the next activation.
        let folder = h.tree.folder(docs).unwrap();
        assert_eq!(folder.child_files, vec!["a.txt", "b.txt"]);

        h.tree.activate(docs);
        h.settle().await;
        assert_eq!(h.tree.folder(docs).unwrap().child_files, vec!["b.txt"]);
        assert!(h.tree.file(file).is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_file() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/docs");
        h.settle().await;
        let file = h.id("/docs/a.txt");
        // Remove it behind the tree's back so the unlink fails.
        backend.unlink("/docs/a.txt").await.unwrap();
        h.tree.delete_file(file);
        h.settle().await;
        let state = h.tree.file(file).unwrap();
        assert!(!state.deleted);
        assert!(!state.is_deleting());
    }

    #[tokio::test]
    async fn rename_updates_only_the_file() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/docs");
        h.settle().await;
        let docs = h.id("/docs");
        let file = h.id("/docs/a.txt");

        h.tree.begin_rename(file);
        h.tree.input_mut(file).unwrap().text = InputState::with_text("c.txt");
        h.tree.commit_rename(file);
        h.settle().await;

        assert!(backend.exists("/docs/c.txt"));
        let state = h.tree.file(file).unwrap();
        assert_eq!(state.name, "c.txt");
        assert_eq!(state.path, "/docs/c.txt");
        assert!(state.rename.is_none());
        assert_eq!(
            h.tree.folder(docs).unwrap().child_files,
            vec!["a.txt", "b.txt"]
        );

        h.tree.activate(docs);
        h.settle().await;
        assert_eq!(
            h.tree.folder(docs).unwrap().child_files,
            vec!["b.txt", "c.txt"]
        );
        // The renamed node is kept under its new name.
        assert_eq!(h.id("/docs/c.txt"), file);
        assert_eq!(
            h.visible_paths(),
            vec!["/", "/docs", "/docs/b.txt", "/docs/c.txt", "/readme.txt"]
        );
    }

    fn create_file_in(h: &mut Harness, folder: NodeId, name: &str) {
        h.tree.begin_create(folder, CreateKind::File);
        h.tree.input_mut(folder).unwrap().text = InputState::with_text(name);
        h.tree.commit_create(folder);
    }

    #[tokio::test]
    async fn old_name_reused_after_rename_gets_its_own_node() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/docs");
        h.settle().await;
        let docs = h.id("/docs");
        let file = h.id("/docs/a.txt");

        h.tree.begin_rename(file);
        h.tree.input_mut(file).unwrap().text = InputState::with_text("c.txt");
        h.tree.commit_rename(file);
        h.settle().await;

        create_file_in(&mut h, docs, "a.txt");
        h.settle().await;

        assert_eq!(
            h.tree.folder(docs).unwrap().child_files,
            vec!["a.txt", "b.txt", "c.txt"]
        );
        assert_eq!(
            h.visible_paths(),
            vec![
                "/",
                "/docs",
                "/docs/a.txt",
                "/docs/b.txt",
                "/docs/c.txt",
                "/readme.txt"
            ]
        );
        assert_eq!(h.id("/docs/c.txt"), file);
        assert_ne!(h.id("/docs/a.txt"), file);
    }

    #[tokio::test]
    async fn recreated_file_replaces_deleted_node() {
        let backend = backend();
        let mut h = Harness::new(backend.clone(), "/docs");
        h.settle().await;
        let docs = h.id("/docs");
        let file = h.id("/docs/a.txt");

        h.tree.delete_file(file);
        h.settle().await;
        assert!(!h.visible_paths().contains(&"/docs/a.txt".to_string()));

        create_file_in(&mut h, docs, "a.txt");
        h.settle().await;

        assert!(backend.exists("/docs/a.txt"));
        assert!(h.tree.file(file).is_none());
        let recreated = h.id("/docs/a.txt");
        assert_ne!(recreated, file);
        assert_eq!(h.tree.file(recreated).unwrap().mode(), FileMode::Normal);
        assert_eq!(
            h.visible_paths(),
            vec!["/", "/docs", "/docs/a.txt", "/docs/b.txt", "/readme.txt"]
        );
    }

    #[tokio::test]
    async fn rename_to_same_name_makes_no_call() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let file = h.id("/readme.txt");
        h.tree.begin_rename(file);
        h.tree.commit_rename(file);
        assert!(h.tree.is_idle());
        assert!(h.tree.file(file).unwrap().rename.is_none());
    }

    #[tokio::test]
    async fn failed_rename_keeps_input_open() {
        let mut h = Harness::new(backend(), "/docs");
        h.settle().await;
        let file = h.id("/docs/a.txt");
        h.tree.begin_rename(file);
        h.tree.input_mut(file).unwrap().text = InputState::with_text("b.txt");
        h.tree.commit_rename(file);
        h.settle().await;

        let state = h.tree.file(file).unwrap();
        assert_eq!(state.name, "a.txt");
        assert_eq!(state.mode(), FileMode::RenameOpen);
        let input = state.rename.as_ref().unwrap();
        assert_eq!(input.error.as_ref().unwrap().kind, FsErrorKind::AlreadyExists);
        assert!(!input.is_pending());
    }

    #[tokio::test]
    async fn invalid_rename_is_rejected_locally() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let file = h.id("/readme.txt");
        h.tree.begin_rename(file);
        h.tree.input_mut(file).unwrap().text = InputState::with_text("a/b");
        h.tree.commit_rename(file);
        assert!(h.tree.is_idle());
        let input = h.tree.file(file).unwrap().rename.as_ref().unwrap();
        assert_eq!(
            input.error.as_ref().unwrap().kind,
            FsErrorKind::InvalidRequest
        );
    }

    #[tokio::test]
    async fn deleted_file_ignores_menu_and_open() {
        let mut h = Harness::new(backend(), "/");
        h.settle().await;
        let file = h.id("/readme.txt");
        h.tree.delete_file(file);
        h.settle().await;

        h.tree.request_file_menu(file);
        h.tree.open_file(file);
        h.settle().await;
        assert_eq!(h.tree.file(file).unwrap().mode(), FileMode::Deleted);
        assert!(h.emitted.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_browse_scenario() {
        let backend = MemoryBackend::new()
            .with_dir("/docs")
            .with_file("/docs/a.txt", b"")
            .with_file("/readme.txt", b"");
        let mut h = Harness::new(backend.clone(), "/");
        h.settle().await;
        assert_eq!(h.visible_paths(), vec!["/", "/docs", "/readme.txt"]);

        let docs = h.id("/docs");
        assert!(!h.tree.folder(docs).unwrap().expanded);
        h.tree.toggle_expansion(docs);
        h.settle().await;
        assert_eq!(h.tree.store().get("/docs"), Some(true));
        assert_eq!(
            h.visible_paths(),
            vec!["/", "/docs", "/docs/a.txt", "/readme.txt"]
        );

        let file = h.id("/docs/a.txt");
        h.tree.request_file_menu(file);
        h.tree.delete_file(file);
        h.settle().await;

        assert!(!backend.exists("/docs/a.txt"));
        assert_eq!(h.visible_paths(), vec!["/", "/docs", "/readme.txt"]);
        assert_eq!(h.tree.folder(docs).unwrap().child_files, vec!["a.txt"]);
    }
}
