//! OS change notifications.
//!
//! Wraps `notify::RecommendedWatcher` (inotify on Linux, FSEvents/kqueue on
//! macOS). Subscriptions are per directory and non-recursive; raw events are
//! forwarded onto a tokio channel that the watch daemon's dispatch loop
//! drains. Dropping the [`Notifier`] shuts the OS watcher down, which drops
//! the channel sender and ends the dispatch loop.

// Rust guideline compliant 2026-02

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Raw notification as delivered by `notify`.
pub type RawEvent = Result<notify::Event, notify::Error>;

/// What happened to a path, as far as tailing cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file appeared (created, or moved into place).
    Create,
    /// File content was written.
    Write,
    /// The file was renamed away.
    Rename,
    /// The file was deleted.
    Delete,
    /// Access, metadata and watcher-internal events.
    Other,
}

/// A single change for a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Absolute path of the affected file.
    pub path: PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
}

/// Directory-scoped OS change notifier.
pub struct Notifier {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    /// Create a notifier with no subscriptions and the receiver for its events.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<RawEvent>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: RawEvent| {
            let _ = tx.send(res);
        })?;

        Ok((Self { watcher }, rx))
    }

    /// Subscribe to changes of entries directly inside `dir`.
    pub fn watch_dir(&mut self, dir: &Path) -> Result<(), notify::Error> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        log::info!("Watching for file changes: {:?}", dir);
        Ok(())
    }

    /// Drop the subscription for `dir`.
    pub fn unwatch_dir(&mut self, dir: &Path) -> Result<(), notify::Error> {
        self.watcher.unwatch(dir)?;
        log::info!("Stopped watching: {:?}", dir);
        Ok(())
    }

    /// Split a raw `notify::Event` into per-path [`Change`]s.
    pub fn changes(event: &notify::Event) -> Vec<Change> {
        let kind = Self::classify(&event.kind);
        event
            .paths
            .iter()
            .map(|path| Change {
                path: path.clone(),
                kind,
            })
            .collect()
    }

    /// Map `notify::EventKind` to [`ChangeKind`].
    ///
    /// A rename whose destination is the event path counts as a create.
    fn classify(kind: &notify::EventKind) -> ChangeKind {
        use notify::event::{ModifyKind, RenameMode};

        match kind {
            notify::EventKind::Create(_) => ChangeKind::Create,
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Create,
            notify::EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
            notify::EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::Other,
            notify::EventKind::Modify(_) => ChangeKind::Write,
            notify::EventKind::Remove(_) => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{
        AccessKind, CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode,
    };

    #[test]
    fn test_create_notifier() {
        assert!(Notifier::new().is_ok());
    }

    #[test]
    fn test_watch_nonexistent_dir_fails() {
        let (mut notifier, _rx) = Notifier::new().expect("Should create notifier");
        let result = notifier.watch_dir(Path::new("/nonexistent/path/abc123"));
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_and_unwatch_real_directory() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let (mut notifier, _rx) = Notifier::new().expect("Should create notifier");
        assert!(notifier.watch_dir(dir.path()).is_ok());
        assert!(notifier.unwatch_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_classify_create() {
        let kind = notify::EventKind::Create(CreateKind::File);
        assert_eq!(Notifier::classify(&kind), ChangeKind::Create);
    }

    #[test]
    fn test_classify_data_write() {
        let kind = notify::EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert_eq!(Notifier::classify(&kind), ChangeKind::Write);
        let kind = notify::EventKind::Modify(ModifyKind::Any);
        assert_eq!(Notifier::classify(&kind), ChangeKind::Write);
    }

    #[test]
    fn test_classify_metadata_is_other() {
        let kind = notify::EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime));
        assert_eq!(Notifier::classify(&kind), ChangeKind::Other);
    }

    #[test]
    fn test_classify_renames() {
        let kind = notify::EventKind::Modify(ModifyKind::Name(RenameMode::To));
        assert_eq!(Notifier::classify(&kind), ChangeKind::Create);
        let kind = notify::EventKind::Modify(ModifyKind::Name(RenameMode::From));
        assert_eq!(Notifier::classify(&kind), ChangeKind::Rename);
    }

    #[test]
    fn test_classify_remove_and_access() {
        let kind = notify::EventKind::Remove(RemoveKind::File);
        assert_eq!(Notifier::classify(&kind), ChangeKind::Delete);
        let kind = notify::EventKind::Access(AccessKind::Read);
        assert_eq!(Notifier::classify(&kind), ChangeKind::Other);
    }

    #[test]
    fn test_changes_one_per_path() {
        let event = notify::Event::new(notify::EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/a.log"))
            .add_path(PathBuf::from("/tmp/b.log"));
        let changes = Notifier::changes(&event);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].path, PathBuf::from("/tmp/b.log"));
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Create));
    }
}
