//! Helpers for the absolute, `/`-separated paths of the virtual filesystem.
//!
//! These are plain strings, not `std::path::Path`: the remote side defines the
//! separator and the host OS must not reinterpret it.

/// Join a directory path and a child name without doubling the separator.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Replace the trailing `old_name` segment of `path` with `new_name`.
///
/// Mirrors what a rename in place means for a file whose name is known:
/// everything before the name is kept verbatim.
pub fn with_name(path: &str, old_name: &str, new_name: &str) -> String {
    let dir = path.strip_suffix(old_name).unwrap_or(path);
    format!("{dir}{new_name}")
}

/// Parent directory, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Last segment of the path; empty for the root.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or("")
}

/// Canonical form: leading `/`, no empty segments, no trailing `/` except the root.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Whether `path` is a (string) prefix of `start`.
///
/// This is the rule that decides if a folder starts expanded when the store
/// has no entry for it: every ancestor of the start path, and the start path
/// itself, open on first display.
pub fn is_prefix_of(path: &str, start: &str) -> bool {
    start.starts_with(path)
}

/// Whether `name` is usable as a single path segment.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}
