mod app;
mod components;
mod config;
mod error;
mod event;
mod handler;
mod input;
mod logging;
mod theme;
mod transport;
mod tree;
mod tui;
mod ui;
mod vpath;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::app::App;
use crate::config::{AppConfig, BackendConfig, BackendKind, GeneralConfig, LogConfig};
use crate::event::{Event, EventHandler};
use crate::transport::client::VfsClient;
use crate::transport::local::LocalBackend;
use crate::transport::memory::MemoryBackend;
use crate::transport::service::serve;
use crate::transport::Channel;
use crate::tree::{ExpansionStore, Tree};
use crate::tui::{install_panic_hook, Tui};

/// Browse a remote filesystem as a lazily loaded tree.
#[derive(Parser, Debug)]
#[command(name = "vt", version, about)]
struct Cli {
    /// Directory exported as `/` by the local backend (defaults to current directory)
    root: Option<PathBuf>,

    /// Virtual path that starts expanded and takes the cursor
    #[arg(long)]
    start_path: Option<String>,

    /// Browse a built-in in-memory sample tree instead of a directory
    #[arg(long)]
    memory: bool,

    /// Extra config file, applied over the discovered ones
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable mouse capture
    #[arg(long)]
    no_mouse: bool,

    /// Append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Flags as a partial config layered over the files.
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                start_path: self.start_path.clone(),
                mouse: self.no_mouse.then_some(false),
            },
            backend: BackendConfig {
                kind: self.memory.then_some(BackendKind::Memory),
                root: self.root.as_ref().map(|p| p.display().to_string()),
            },
            log: LogConfig {
                file: self.log_file.as_ref().map(|p| p.display().to_string()),
                level: None,
            },
            ..Default::default()
        }
    }
}

/// Start the service task for the configured backend and return its channel.
fn spawn_backend(config: &AppConfig) -> error::Result<Channel> {
    let (channel, inbox) = Channel::pair();
    match config.backend_kind() {
        BackendKind::Memory => {
            tracing::info!("serving built-in sample tree");
            tokio::spawn(serve(MemoryBackend::sample(), inbox));
        }
        BackendKind::Local => {
            let root = PathBuf::from(config.backend_root());
            let root = root.canonicalize().map_err(|_| {
                error::AppError::InvalidPath(format!("{} does not exist", root.display()))
            })?;
            if !root.is_dir() {
                return Err(error::AppError::InvalidPath(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            let backend = LocalBackend::new(&root);
            tracing::info!(root = %backend.root().display(), "serving local directory");
            tokio::spawn(serve(backend, inbox));
        }
    }
    Ok(channel)
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    logging::init(config.log_file(), config.log_level())?;

    let channel = spawn_backend(&config)?;
    let mut client = VfsClient::new(channel);
    if let Some(timeout) = config.transport_timeout() {
        client = client.with_timeout(timeout);
    }

    install_panic_hook();

    let mut tui = Tui::new(config.mouse_enabled())?;
    let mut events = EventHandler::new(Duration::from_millis(50));
    let tree = Tree::new(
        client,
        ExpansionStore::new(),
        config.start_path(),
        events.sender(),
    )
    .with_blur_grace(config.blur_grace());
    let theme = theme::resolve_theme(&config.theme);
    let mut app = App::new(tree).with_icons(config.use_icons());

    loop {
        tui.draw(|frame| ui::render(&mut app, &theme, frame))?;

        match events.next().await? {
            Event::Key(key) => handler::handle_key_event(&mut app, key),
            Event::Mouse(mouse) => handler::handle_mouse_event(&mut app, mouse),
            other => app.handle_event(other),
        }

        if app.should_quit {
            break;
        }
    }

    tui.restore()?;
    tracing::info!("exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::parse_from([
            "vt",
            "/srv/export",
            "--start-path",
            "/www",
            "--memory",
            "--no-mouse",
        ]);
        let cfg = AppConfig::default().merge(&cli.overrides());
        assert_eq!(cfg.backend_root(), "/srv/export");
        assert_eq!(cfg.backend_kind(), BackendKind::Memory);
        assert_eq!(cfg.start_path(), "/www");
        assert!(!cfg.mouse_enabled());
    }

    #[test]
    fn absent_flags_do_not_override_files() {
        let cli = Cli::parse_from(["vt"]);
        let file = AppConfig {
            general: GeneralConfig {
                mouse: Some(false),
                start_path: Some("/docs".into()),
            },
            ..Default::default()
        };
        let cfg = file.merge(&cli.overrides());
        assert!(!cfg.mouse_enabled());
        assert_eq!(cfg.start_path(), "/docs");
        assert_eq!(cfg.backend_kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn missing_local_root_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            backend: BackendConfig {
                kind: Some(BackendKind::Local),
                root: Some(dir.path().join("nope").display().to_string()),
            },
            ..Default::default()
        };
        assert!(matches!(
            spawn_backend(&config),
            Err(error::AppError::InvalidPath(_))
        ));
    }
}
