use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::vpath;

/// Session-scoped memory of which folders the user opened or closed.
///
/// Created once at start-up and handed to the tree; clones share the same
/// map. Keys are never removed, so the state outlives the folder nodes and is
/// picked up again when the same path is displayed later.
#[derive(Debug, Clone, Default)]
pub struct ExpansionStore {
    inner: Arc<Mutex<HashMap<String, bool>>>,
}

impl ExpansionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<bool> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .copied()
    }

    /// Record an explicit expand/collapse. Last write wins.
    pub fn set(&self, path: &str, expanded: bool) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), expanded);
    }

    /// Initial expansion for a folder being created: the stored value, else
    /// whether `path` leads to `start_path`.
    pub fn initial(&self, path: &str, start_path: &str) -> bool {
        self.get(path)
            .unwrap_or_else(|| vpath::is_prefix_of(path, start_path))
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
