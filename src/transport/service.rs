//! Server side of the channel: decode a [`Request`], run it against a
//! [`Backend`], send the [`Reply`].

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};

use super::client::PathInfo;
use super::{Inbox, Reply, Request, ANALYZE_PATH, MKDIR, READDIR, RENAME, UNLINK, WRITE_FILE};
use crate::error::FsError;

/// A filesystem that can answer the six protocol commands.
pub trait Backend: Clone + Send + Sync + 'static {
    fn readdir(&self, path: &str) -> impl Future<Output = Result<Vec<String>, FsError>> + Send;

    fn analyze_path(&self, path: &str) -> impl Future<Output = Result<PathInfo, FsError>> + Send;

    fn write_file(
        &self,
        path: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), FsError>> + Send;

    fn mkdir(&self, path: &str) -> impl Future<Output = Result<(), FsError>> + Send;

    fn rename(&self, from: &str, to: &str) -> impl Future<Output = Result<(), FsError>> + Send;

    fn unlink(&self, path: &str) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Artificial delay applied before answering `request`.
    fn latency(&self, _request: &Request) -> Duration {
        Duration::ZERO
    }
}

/// Run one request against `backend`.
pub async fn dispatch<B: Backend>(backend: &B, request: &Request) -> Result<Value, FsError> {
    match request.command.as_str() {
        READDIR => {
            let names = backend.readdir(request.str_arg(0)?).await?;
            Ok(json!(names))
        }
        ANALYZE_PATH => {
            let info = backend.analyze_path(request.str_arg(0)?).await?;
            Ok(serde_json::to_value(info)?)
        }
        WRITE_FILE => {
            let bytes = request.bytes_arg(1)?;
            backend.write_file(request.str_arg(0)?, bytes).await?;
            Ok(Value::Null)
        }
        MKDIR => {
            backend.mkdir(request.str_arg(0)?).await?;
            Ok(Value::Null)
        }
        RENAME => {
            backend
                .rename(request.str_arg(0)?, request.str_arg(1)?)
                .await?;
            Ok(Value::Null)
        }
        UNLINK => {
            backend.unlink(request.str_arg(0)?).await?;
            Ok(Value::Null)
        }
        other => Err(FsError::invalid(format!("unknown command `{other}`"))),
    }
}

/// Answer every request arriving on `inbox` until all senders are dropped.
///
/// Each request is handled in its own task, so replies may complete in any
/// order.
pub async fn serve<B: Backend>(backend: B, mut inbox: Inbox) {
    while let Some(envelope) = inbox.recv().await {
        let backend = backend.clone();
        tokio::spawn(async move {
            let delay = backend.latency(&envelope.request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = dispatch(&backend, &envelope.request).await;
            if let Err(ref err) = result {
                tracing::debug!(command = %envelope.request.command, error = %err, "request failed");
            }
            envelope.respond(Reply::from(result));
        });
    }
    tracing::debug!("transport inbox closed, backend stopping");
}
