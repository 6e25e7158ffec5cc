//! File tailing driven by OS change notifications.
//!
//! - [`notifier`] wraps the OS watcher and classifies raw notifications.
//! - [`source`] holds the source traits and the file tailing source.
//! - [`daemon`] owns the registry and the dispatch loop.

// Rust guideline compliant 2026-02

pub mod daemon;
pub mod notifier;
pub mod source;

use std::path::PathBuf;

use thiserror::Error;

pub use daemon::WatchDaemon;
pub use notifier::{Change, ChangeKind};
pub use source::{EventHandler, EventSource, FileSource, GenericSource, WatchedSource};

/// Errors from tailing sources and the watch daemon.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The OS notifier failed to start, subscribe, or deliver.
    #[error("file notifier error: {0}")]
    Notifier(#[from] notify::Error),
    /// Reading a watched file failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The path has no parent directory or file name.
    #[error("cannot watch {}: not a file path", .0.display())]
    InvalidPath(PathBuf),
    /// `start` was called twice.
    #[error("watch daemon already started")]
    AlreadyStarted,
    /// `stop` was called before `start`.
    #[error("watch daemon not started")]
    NotStarted,
    /// The daemon was stopped and cannot be used again.
    #[error("watch daemon stopped")]
    Stopped,
    /// No source is registered under this name.
    #[error("no source named {0:?}")]
    UnknownSource(String),
    /// `start` was called outside a tokio runtime.
    #[error("watch daemon must be started inside a tokio runtime")]
    NoRuntime,
}
