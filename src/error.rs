use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from the terminal or local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Logging could not be initialized.
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Failure categories reported by the backing filesystem service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsErrorKind {
    NotFound,
    NotADirectory,
    NotAFile,
    AlreadyExists,
    /// Malformed command or arguments.
    InvalidRequest,
    /// Channel unreachable, reply dropped, or reply never arrived.
    Transport,
    /// Any other service-side failure.
    Io,
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FsErrorKind::NotFound => "not found",
            FsErrorKind::NotADirectory => "not a directory",
            FsErrorKind::NotAFile => "not a file",
            FsErrorKind::AlreadyExists => "already exists",
            FsErrorKind::InvalidRequest => "invalid request",
            FsErrorKind::Transport => "transport failure",
            FsErrorKind::Io => "I/O error",
        };
        f.write_str(label)
    }
}

/// A failed protocol call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct FsError {
    pub kind: FsErrorKind,
    pub message: String,
}

impl FsError {
    pub fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(FsErrorKind::NotFound, path)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FsErrorKind::Transport, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(FsErrorKind::InvalidRequest, message)
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::NotFound => FsErrorKind::NotFound,
            ErrorKind::AlreadyExists => FsErrorKind::AlreadyExists,
            ErrorKind::NotADirectory => FsErrorKind::NotADirectory,
            ErrorKind::IsADirectory => FsErrorKind::NotAFile,
            ErrorKind::InvalidInput => FsErrorKind::InvalidRequest,
            _ => FsErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for FsError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(err.to_string())
    }
}
