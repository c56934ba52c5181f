use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, MouseEvent};
use tokio::sync::mpsc;

use crate::error::{FsError, Result};
use crate::tree::NodeId;

/// A folder's contents, already classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Completion of one folder activation.
#[derive(Debug)]
pub struct ListingResult {
    pub node: NodeId,
    /// Activation ticket; a result whose ticket is no longer current is dropped.
    pub ticket: u64,
    pub outcome: std::result::Result<Listing, FsError>,
}

/// A mutating call issued by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateFile { path: String },
    CreateFolder { path: String },
    Rename {
        from: String,
        to: String,
        new_name: String,
    },
    Delete { path: String },
}

impl Mutation {
    /// Past-tense summary for the status bar.
    pub fn describe(&self) -> String {
        match self {
            Mutation::CreateFile { path } => format!("Created {path}"),
            Mutation::CreateFolder { path } => format!("Created folder {path}"),
            Mutation::Rename { from, to, .. } => format!("Renamed {from} → {to}"),
            Mutation::Delete { path } => format!("Deleted {path}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Succeeded,
    Failed(FsError),
}

impl From<std::result::Result<(), FsError>> for MutationOutcome {
    fn from(result: std::result::Result<(), FsError>) -> Self {
        match result {
            Ok(()) => MutationOutcome::Succeeded,
            Err(err) => MutationOutcome::Failed(err),
        }
    }
}

/// Completion of one mutating call.
#[derive(Debug)]
pub struct MutationResult {
    pub node: NodeId,
    pub ticket: u64,
    pub mutation: Mutation,
    pub outcome: MutationOutcome,
}

/// Application events.
#[derive(Debug)]
pub enum Event {
    /// A key press event.
    Key(KeyEvent),
    /// A mouse event.
    Mouse(MouseEvent),
    /// A periodic tick for rendering and menu auto-close.
    Tick,
    /// Terminal resize event.
    Resize(u16, u16),
    /// A folder activation finished.
    Listing(ListingResult),
    /// A create/rename/delete call finished.
    Mutation(MutationResult),
    /// A file node asked for its file to be opened.
    OpenFile(String),
}

/// Async event handler that polls crossterm events and forwards them via a channel.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler {
    /// Create a new EventHandler with the given tick rate.
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();

        tokio::spawn(async move {
            loop {
                // crossterm polling blocks; keep it off the async workers.
                let polled = tokio::task::spawn_blocking(move || {
                    if event::poll(tick_rate).unwrap_or(false) {
                        event::read().ok()
                    } else {
                        None
                    }
                })
                .await
                .ok()
                .flatten();

                let forwarded = match polled {
                    Some(CrosstermEvent::Key(key)) => event_tx.send(Event::Key(key)),
                    Some(CrosstermEvent::Mouse(mouse)) => event_tx.send(Event::Mouse(mouse)),
                    Some(CrosstermEvent::Resize(w, h)) => event_tx.send(Event::Resize(w, h)),
                    Some(_) => Ok(()),
                    None => event_tx.send(Event::Tick),
                };
                if forwarded.is_err() {
                    break;
                }
            }
        });

        Self { rx, tx }
    }

    /// Get a sender clone for async tasks to report completions.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Receive the next event (blocks until available).
    pub async fn next(&mut self) -> Result<Event> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| crate::error::AppError::Terminal("Event channel closed".into()))
    }
}
