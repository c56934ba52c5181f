//! File logging. The terminal belongs to the UI, so events only ever go to a
//! file, and only when one is configured.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AppError, Result};

/// Build the filter: `RUST_LOG` wins over the configured level.
fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| AppError::Logging(format!("invalid log level `{level}`: {e}")))
}

/// Install the global subscriber appending to `file`. No-op without a file.
pub fn init(file: Option<&Path>, level: &str) -> Result<()> {
    let Some(path) = file else {
        return Ok(());
    };
    let writer = OpenOptions::new().create(true).append(true).open(path)?;
    fmt()
        .with_env_filter(filter(level)?)
        .with_writer(Mutex::new(writer))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;
    tracing::info!(log = %path.display(), "logging started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_installs_nothing() {
        assert!(init(None, "debug").is_ok());
    }

    #[test]
    fn unwritable_log_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing").join("vt.log");
        assert!(matches!(init(Some(&missing), "info"), Err(AppError::Io(_))));
    }

    #[test]
    fn level_directives_parse() {
        // RUST_LOG may be set in the environment; only check explicit levels
        // when it is not.
        if std::env::var("RUST_LOG").is_err() {
            assert!(filter("debug").is_ok());
            assert!(filter("vfs_tree=trace,warn").is_ok());
        }
    }
}
