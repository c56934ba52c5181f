use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Channel, ANALYZE_PATH, MKDIR, READDIR, RENAME, UNLINK, WRITE_FILE};
use crate::error::FsError;

/// Reply payload of `analyzePath`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathInfo {
    pub path: String,
    pub exists: bool,
    pub is_folder: bool,
}

/// Typed protocol calls over a [`Channel`].
///
/// The optional timeout is applied per call; an expired call is reported as a
/// transport failure.
#[derive(Debug, Clone)]
pub struct VfsClient {
    channel: Channel,
    timeout: Option<Duration>,
}

impl VfsClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn call(&self, command: &str, args: Vec<Value>) -> Result<Value, FsError> {
        let fut = self.channel.send(command, args);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                FsError::transport(format!("{command}: no reply within {limit:?}"))
            })?,
            None => fut.await,
        }
    }

    /// Raw directory listing, `.` and `..` included.
    pub async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let value = self.call(READDIR, vec![json!(path)]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn analyze_path(&self, path: &str) -> Result<PathInfo, FsError> {
        let value = self.call(ANALYZE_PATH, vec![json!(path)]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        self.call(WRITE_FILE, vec![json!(path), json!(bytes)])
            .await
            .map(drop)
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        self.call(MKDIR, vec![json!(path)]).await.map(drop)
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        self.call(RENAME, vec![json!(from), json!(to)]).await.map(drop)
    }

    pub async fn unlink(&self, path: &str) -> Result<(), FsError> {
        self.call(UNLINK, vec![json!(path)]).await.map(drop)
    }
}
