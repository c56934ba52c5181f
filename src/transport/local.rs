use std::path::{Path, PathBuf};

use tokio::fs;

use super::client::PathInfo;
use super::service::Backend;
use crate::error::{FsError, FsErrorKind};
use crate::vpath;

/// Exports a directory on the host as the virtual filesystem `/`.
///
/// Virtual paths are resolved below `root`; `.` and `..` segments are refused
/// so no request can reach outside it.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to a host path below `root`.
    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(FsError::invalid(format!("{path}: relative segment")));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    async fn require_dir(host: &Path, path: &str) -> Result<(), FsError> {
        let meta = fs::metadata(host).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(FsError::new(FsErrorKind::NotADirectory, path))
        }
    }

    async fn require_file(host: &Path, path: &str) -> Result<(), FsError> {
        let meta = fs::symlink_metadata(host).await?;
        if meta.is_dir() {
            Err(FsError::new(FsErrorKind::NotAFile, path))
        } else {
            Ok(())
        }
    }
}

impl Backend for LocalBackend {
    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let host = self.resolve(path)?;
        Self::require_dir(&host, path).await?;

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&host).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();

        let mut listing = vec![".".to_string(), "..".to_string()];
        listing.extend(names);
        Ok(listing)
    }

    async fn analyze_path(&self, path: &str) -> Result<PathInfo, FsError> {
        let host = self.resolve(path)?;
        let (exists, is_folder) = match fs::metadata(&host).await {
            Ok(meta) => (true, meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (false, false),
            Err(e) => return Err(e.into()),
        };
        Ok(PathInfo {
            path: vpath::normalize(path),
            exists,
            is_folder,
        })
    }

    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), FsError> {
        let host = self.resolve(path)?;
        if fs::metadata(&host).await.is_ok_and(|m| m.is_dir()) {
            return Err(FsError::new(FsErrorKind::NotAFile, path));
        }
        fs::write(&host, bytes).await?;
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let host = self.resolve(path)?;
        fs::create_dir(&host).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let from_host = self.resolve(from)?;
        let to_host = self.resolve(to)?;
        if fs::symlink_metadata(&from_host).await.is_err() {
            return Err(FsError::not_found(from));
        }
        // The host rename would silently replace an existing file.
        if fs::symlink_metadata(&to_host).await.is_ok() {
            return Err(FsError::new(FsErrorKind::AlreadyExists, to));
        }
        fs::rename(&from_host, &to_host).await?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        let host = self.resolve(path)?;
        Self::require_file(&host, path).await?;
        fs::remove_file(&host).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self as stdfs, File};
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        stdfs::create_dir(dir.path().join("alpha")).unwrap();
        File::create(dir.path().join("file_a.txt")).unwrap();
        File::create(dir.path().join("alpha").join("inner.txt")).unwrap();
        dir
    }

    #[tokio::test]
    async fn readdir_sorted_with_dot_entries() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        let names = backend.readdir("/").await.unwrap();
        assert_eq!(names, vec![".", "..", "alpha", "file_a.txt"]);
    }

    #[tokio::test]
    async fn readdir_nested_and_errors() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        assert_eq!(
            backend.readdir("/alpha").await.unwrap(),
            vec![".", "..", "inner.txt"]
        );
        assert_eq!(
            backend.readdir("/file_a.txt").await.unwrap_err().kind,
            FsErrorKind::NotADirectory
        );
        assert_eq!(
            backend.readdir("/missing").await.unwrap_err().kind,
            FsErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn analyze_path_reports_folder_flag() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        let alpha = backend.analyze_path("/alpha").await.unwrap();
        assert!(alpha.exists && alpha.is_folder);
        assert_eq!(alpha.path, "/alpha");
        let file = backend.analyze_path("/file_a.txt").await.unwrap();
        assert!(file.exists && !file.is_folder);
        assert!(!backend.analyze_path("/ghost").await.unwrap().exists);
    }

    #[tokio::test]
    async fn parent_segments_are_refused() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(&dir.path().join("alpha"));
        let err = backend.readdir("/../").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn write_file_creates_empty_file() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        backend.write_file("/alpha/new.txt", Vec::new()).await.unwrap();
        let meta = stdfs::metadata(dir.path().join("alpha/new.txt")).unwrap();
        assert_eq!(meta.len(), 0);
        assert_eq!(
            backend.write_file("/alpha", Vec::new()).await.unwrap_err().kind,
            FsErrorKind::NotAFile
        );
    }

    #[tokio::test]
    async fn mkdir_and_collision() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        backend.mkdir("/beta").await.unwrap();
        assert!(dir.path().join("beta").is_dir());
        assert_eq!(
            backend.mkdir("/beta").await.unwrap_err().kind,
            FsErrorKind::AlreadyExists
        );
    }

    #[tokio::test]
    async fn rename_refuses_occupied_target() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        backend
            .rename("/file_a.txt", "/file_b.txt")
            .await
            .unwrap();
        assert!(dir.path().join("file_b.txt").exists());
        assert!(!dir.path().join("file_a.txt").exists());

        File::create(dir.path().join("taken.txt")).unwrap();
        let err = backend
            .rename("/file_b.txt", "/taken.txt")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FsErrorKind::AlreadyExists);
        let err = backend.rename("/ghost", "/x").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unlink_files_only() {
        let dir = setup_test_dir();
        let backend = LocalBackend::new(dir.path());
        backend.unlink("/file_a.txt").await.unwrap();
        assert!(!dir.path().join("file_a.txt").exists());
        assert_eq!(
            backend.unlink("/alpha").await.unwrap_err().kind,
            FsErrorKind::NotAFile
        );
        assert_eq!(
            backend.unlink("/file_a.txt").await.unwrap_err().kind,
            FsErrorKind::NotFound
        );
    }
}
