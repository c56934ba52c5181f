use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::client::PathInfo;
use super::service::Backend;
use super::Request;
use crate::error::{FsError, FsErrorKind};
use crate::vpath;

/// Per-request delay function, used to shuffle reply order.
pub type LatencyFn = Arc<dyn Fn(&Request) -> Duration + Send + Sync>;

#[derive(Debug, Clone)]
enum MemNode {
    Dir,
    File(Vec<u8>),
}

/// An in-memory filesystem keyed by normalized absolute path.
#[derive(Clone)]
pub struct MemoryBackend {
    nodes: Arc<Mutex<BTreeMap<String, MemNode>>>,
    latency: Option<LatencyFn>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), MemNode::Dir);
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
            latency: None,
        }
    }

    /// A small tree to browse when no directory is exported.
    pub fn sample() -> Self {
        Self::new()
            .with_file("/readme.txt", b"Remote filesystem sample.\n")
            .with_file("/docs/guide.md", b"# Guide\n")
            .with_file("/docs/notes.txt", b"")
            .with_file("/srv/www/index.php", b"<?php echo 'hi';\n")
            .with_file("/srv/www/style.css", b"body {}\n")
            .with_dir("/tmp")
    }

    #[cfg(test)]
    pub fn with_latency(mut self, latency: LatencyFn) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed a directory, creating missing ancestors.
    pub fn with_dir(self, path: &str) -> Self {
        {
            let mut nodes = self.lock();
            let path = vpath::normalize(path);
            Self::ensure_ancestors(&mut nodes, &path);
            nodes.insert(path, MemNode::Dir);
        }
        self
    }

    /// Seed a file, creating missing ancestors.
    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        {
            let mut nodes = self.lock();
            let path = vpath::normalize(path);
            Self::ensure_ancestors(&mut nodes, &path);
            nodes.insert(path, MemNode::File(contents.to_vec()));
        }
        self
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().contains_key(&vpath::normalize(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.lock().get(&vpath::normalize(path)), Some(MemNode::Dir))
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().get(&vpath::normalize(path)) {
            Some(MemNode::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, MemNode>> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every mutation is a single insert/remove batch.
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_ancestors(nodes: &mut BTreeMap<String, MemNode>, path: &str) {
        let mut current = vpath::parent(path);
        while let Some(dir) = current {
            nodes.entry(dir.to_string()).or_insert(MemNode::Dir);
            current = vpath::parent(dir);
        }
    }

    fn require_parent_dir(nodes: &BTreeMap<String, MemNode>, path: &str) -> Result<(), FsError> {
        let parent = vpath::parent(path)
            .ok_or_else(|| FsError::new(FsErrorKind::AlreadyExists, "/"))?;
        match nodes.get(parent) {
            Some(MemNode::Dir) => Ok(()),
            Some(MemNode::File(_)) => Err(FsError::new(FsErrorKind::NotADirectory, parent)),
            None => Err(FsError::not_found(parent)),
        }
    }

    fn is_child_of(candidate: &str, dir: &str) -> bool {
        candidate != dir && vpath::parent(candidate) == Some(dir)
    }
}

impl Backend for MemoryBackend {
    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let path = vpath::normalize(path);
        let nodes = self.lock();
        match nodes.get(&path) {
            Some(MemNode::Dir) => {}
            Some(MemNode::File(_)) => return Err(FsError::new(FsErrorKind::NotADirectory, path)),
            None => return Err(FsError::not_found(&path)),
        }
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(
            nodes
                .keys()
                .filter(|k| Self::is_child_of(k, &path))
                .map(|k| vpath::file_name(k).to_string()),
        );
        Ok(names)
    }

    async fn analyze_path(&self, path: &str) -> Result<PathInfo, FsError> {
        let path = vpath::normalize(path);
        let nodes = self.lock();
        let node = nodes.get(&path);
        Ok(PathInfo {
            exists: node.is_some(),
            is_folder: matches!(node, Some(MemNode::Dir)),
            path,
        })
    }

    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), FsError> {
        let path = vpath::normalize(path);
        let mut nodes = self.lock();
        Self::require_parent_dir(&nodes, &path)?;
        if let Some(MemNode::Dir) = nodes.get(&path) {
            return Err(FsError::new(FsErrorKind::NotAFile, path));
        }
        nodes.insert(path, MemNode::File(bytes));
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let path = vpath::normalize(path);
        let mut nodes = self.lock();
        Self::require_parent_dir(&nodes, &path)?;
        if nodes.contains_key(&path) {
            return Err(FsError::new(FsErrorKind::AlreadyExists, path));
        }
        nodes.insert(path, MemNode::Dir);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let from = vpath::normalize(from);
        let to = vpath::normalize(to);
        let mut nodes = self.lock();
        if !nodes.contains_key(&from) || from == "/" {
            return Err(FsError::not_found(&from));
        }
        if nodes.contains_key(&to) {
            return Err(FsError::new(FsErrorKind::AlreadyExists, to));
        }
        Self::require_parent_dir(&nodes, &to)?;
        if to.starts_with(&format!("{from}/")) {
            return Err(FsError::invalid(format!("cannot move {from} into itself")));
        }

        let subtree_prefix = format!("{from}/");
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| **k == from || k.starts_with(&subtree_prefix))
            .cloned()
            .collect();
        for old_key in moved {
            if let Some(node) = nodes.remove(&old_key) {
                let new_key = format!("{to}{}", &old_key[from.len()..]);
                nodes.insert(new_key, node);
            }
        }
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        let path = vpath::normalize(path);
        let mut nodes = self.lock();
        match nodes.get(&path) {
            Some(MemNode::File(_)) => {}
            Some(MemNode::Dir) => return Err(FsError::new(FsErrorKind::NotAFile, path)),
            None => return Err(FsError::not_found(&path)),
        }
        nodes.remove(&path);
        Ok(())
    }

    fn latency(&self, request: &Request) -> Duration {
        self.latency
            .as_ref()
            .map(|f| f(request))
            .unwrap_or(Duration::ZERO)
    }
}
