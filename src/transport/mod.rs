//! Request/response message channel to the backing filesystem service.
//!
//! ```text
//!   Channel (Clone)            mpsc       backing service
//!   ┌──────────────────┐   ─────────▶   ┌──────────────────────┐
//!   │ send(cmd, args)  │   Envelope     │ Inbox::recv()        │
//!   │                  │   ◀─────────   │ answers each request │
//!   └──────────────────┘    oneshot     └──────────────────────┘
//! ```
//!
//! Every call resolves with exactly one reply or one failure. Concurrent calls
//! are independent; nothing orders them relative to each other. The channel
//! itself has no timeout or retry ([`client::VfsClient`] adds a timeout).

pub mod client;
pub mod local;
pub mod memory;
pub mod service;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{FsError, FsErrorKind};

pub const READDIR: &str = "readdir";
pub const ANALYZE_PATH: &str = "analyzePath";
pub const WRITE_FILE: &str = "writeFile";
pub const MKDIR: &str = "mkdir";
pub const RENAME: &str = "rename";
pub const UNLINK: &str = "unlink";

/// A named command and its positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(command: &str, args: Vec<Value>) -> Self {
        Self {
            command: command.to_string(),
            args,
        }
    }

    /// Positional string argument, or an `InvalidRequest` failure.
    pub fn str_arg(&self, index: usize) -> Result<&str, FsError> {
        self.args
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FsError::invalid(format!(
                    "{}: argument {} must be a string",
                    self.command, index
                ))
            })
    }

    /// Positional byte-array argument (a JSON array of numbers 0..=255).
    pub fn bytes_arg(&self, index: usize) -> Result<Vec<u8>, FsError> {
        let value = self.args.get(index).cloned().ok_or_else(|| {
            FsError::invalid(format!("{}: missing argument {}", self.command, index))
        })?;
        Ok(serde_json::from_value(value)?)
    }
}

/// What the service sends back for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Ok { value: Value },
    Err { kind: FsErrorKind, message: String },
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Reply::Ok { value }
    }

    pub fn into_result(self) -> Result<Value, FsError> {
        match self {
            Reply::Ok { value } => Ok(value),
            Reply::Err { kind, message } => Err(FsError::new(kind, message)),
        }
    }
}

impl From<Result<Value, FsError>> for Reply {
    fn from(result: Result<Value, FsError>) -> Self {
        match result {
            Ok(value) => Reply::Ok { value },
            Err(err) => Reply::Err {
                kind: err.kind,
                message: err.message,
            },
        }
    }
}

/// A request in flight, paired with the slot its reply goes into.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    reply: oneshot::Sender<Reply>,
}

impl Envelope {
    /// Deliver the reply. A caller that stopped waiting is not an error.
    pub fn respond(self, reply: Reply) {
        let _ = self.reply.send(reply);
    }
}

/// Sending half of the message bus. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Channel {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Receiving half, drained by whatever answers the requests.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Inbox {
    /// Next pending request, or `None` once every `Channel` is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

impl Channel {
    /// Create a connected channel/inbox pair.
    pub fn pair() -> (Channel, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Channel { tx }, Inbox { rx })
    }

    /// Send `command` with `args` and wait for its single reply.
    pub async fn send(&self, command: &str, args: Vec<Value>) -> Result<Value, FsError> {
        let (reply, rx) = oneshot::channel();
        let request = Request::new(command, args);
        tracing::debug!(command, args = ?request.args, "transport send");
        self.tx
            .send(Envelope { request, reply })
            .map_err(|_| FsError::transport("backing service is not running"))?;
        rx.await
            .map_err(|_| FsError::transport(format!("{command}: reply dropped")))?
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_resolves_with_reply_value() {
        let (channel, mut inbox) = Channel::pair();
        tokio::spawn(async move {
            while let Some(env) = inbox.recv().await {
                let echoed = json!({ "cmd": env.request.command.clone(), "n": env.request.args.len() });
                env.respond(Reply::ok(echoed));
            }
        });

        let value = channel.send("ping", vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(value, json!({ "cmd": "ping", "n": 2 }));
    }

    #[tokio::test]
    async fn send_surfaces_service_error() {
        let (channel, mut inbox) = Channel::pair();
        tokio::spawn(async move {
            if let Some(env) = inbox.recv().await {
                env.respond(Reply::Err {
                    kind: FsErrorKind::NotFound,
                    message: "/nope".into(),
                });
            }
        });

        let err = channel.send(READDIR, vec![json!("/nope")]).await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::NotFound);
    }

    #[tokio::test]
    async fn send_without_service_is_transport_failure() {
        let (channel, inbox) = Channel::pair();
        drop(inbox);
        let err = channel.send(READDIR, vec![json!("/")]).await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::Transport);
    }

    #[tokio::test]
    async fn dropped_envelope_is_transport_failure() {
        let (channel, mut inbox) = Channel::pair();
        tokio::spawn(async move {
            // Swallow the request without answering.
            let _ = inbox.recv().await;
        });
        let err = channel.send(MKDIR, vec![json!("/a")]).await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::Transport);
    }

    #[test]
    fn reply_wire_format_is_tagged() {
        let json = serde_json::to_value(Reply::ok(Value::Null)).unwrap();
        assert_eq!(json, json!({ "status": "ok", "value": null }));

        let err = Reply::from(Err::<Value, _>(FsError::not_found("/x")));
        let json = serde_json::to_value(err).unwrap();
        assert_eq!(
            json,
            json!({ "status": "err", "kind": "NotFound", "message": "/x" })
        );
    }

    #[test]
    fn request_argument_accessors() {
        let req = Request::new(WRITE_FILE, vec![json!("/a.txt"), json!([104, 105])]);
        assert_eq!(req.str_arg(0).unwrap(), "/a.txt");
        assert_eq!(req.bytes_arg(1).unwrap(), b"hi".to_vec());
        assert_eq!(req.str_arg(1).unwrap_err().kind, FsErrorKind::InvalidRequest);
        assert_eq!(req.bytes_arg(5).unwrap_err().kind, FsErrorKind::InvalidRequest);
    }
}
