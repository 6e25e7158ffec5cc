//! Event sources and file tailing.
//!
//! [`EventSource`] is the handler-registration seam the CLI drives;
//! [`GenericSource`] implements it for any source kind. [`WatchedSource`]
//! adds what the watch daemon needs to route OS notifications, and
//! [`FileSource`] implements it for an appended-to file.

// Rust guideline compliant 2026-02

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::notifier::ChangeKind;
use super::WatchError;

/// Callback receiving `(source, diff)` for every change of a source.
pub type EventHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Anything that produces diffs and lets callers subscribe to them.
pub trait EventSource: Send + Sync {
    /// Register `handler`; handlers run in registration order.
    fn on_change(&self, handler: EventHandler);

    /// Deliver `diff` to every registered handler.
    fn trigger(&self, diff: &[u8]);
}

/// A source the watch daemon can route OS notifications to.
pub trait WatchedSource: EventSource {
    /// Absolute path whose notifications belong to this source.
    fn path(&self) -> &Path;

    /// Directory to subscribe with the OS notifier.
    fn parent_dir(&self) -> &Path;

    /// React to a notification for [`Self::path`].
    fn on_notify(&self, kind: ChangeKind) -> Result<(), WatchError>;
}

/// Handler list plus the label handlers are called with.
pub struct GenericSource {
    label: String,
    handlers: Mutex<Vec<EventHandler>>,
}

impl std::fmt::Debug for GenericSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericSource")
            .field("label", &self.label)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl GenericSource {
    /// Source whose handlers receive `label` as the source name.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Name passed to handlers.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().expect("source handlers mutex poisoned").len()
    }
}

impl EventSource for GenericSource {
    fn on_change(&self, handler: EventHandler) {
        self.handlers
            .lock()
            .expect("source handlers mutex poisoned")
            .push(handler);
    }

    fn trigger(&self, diff: &[u8]) {
        // Snapshot so handlers may register further handlers without deadlocking.
        let handlers = self
            .handlers
            .lock()
            .expect("source handlers mutex poisoned")
            .clone();
        for handler in handlers {
            handler(&self.label, diff);
        }
    }
}

/// Tails one file: remembers how far it has been read and reports appends.
pub struct FileSource {
    base: GenericSource,
    path: PathBuf,
    parent_dir: PathBuf,
    /// Bytes already consumed. Held for the whole read-advance-trigger step.
    offset: Mutex<u64>,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("label", &self.base.label())
            .field("path", &self.path)
            .field("offset", &self.offset())
            .finish_non_exhaustive()
    }
}

impl FileSource {
    /// Start tailing `path` from its current end.
    ///
    /// Content already in the file is never reported. A missing file starts
    /// at offset 0; its parent directory must exist to be watched.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let path = path.as_ref();
        let (parent_dir, abs_path) = file_parts(path)?;

        let offset = match std::fs::metadata(&abs_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                log::debug!("{} not readable yet ({e}); starting at 0", abs_path.display());
                0
            }
        };

        Ok(Self {
            base: GenericSource::new(path.to_string_lossy()),
            path: abs_path,
            parent_dir,
            offset: Mutex::new(offset),
        })
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        *self.offset.lock().expect("file source offset mutex poisoned")
    }

    /// Name handlers receive (the path as registered).
    pub fn label(&self) -> &str {
        self.base.label()
    }
}

impl EventSource for FileSource {
    fn on_change(&self, handler: EventHandler) {
        self.base.on_change(handler);
    }

    fn trigger(&self, diff: &[u8]) {
        self.base.trigger(diff);
    }
}

impl WatchedSource for FileSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        &self.parent_dir
    }

    fn on_notify(&self, kind: ChangeKind) -> Result<(), WatchError> {
        if !matches!(kind, ChangeKind::Write | ChangeKind::Create) {
            return Ok(());
        }

        let mut offset = self.offset.lock().expect("file source offset mutex poisoned");
        if kind == ChangeKind::Create {
            *offset = file_len(&self.path)?;
        }

        let diff = read_appended(&self.path, &mut offset)?;
        if !diff.is_empty() {
            self.base.trigger(&diff);
        }
        Ok(())
    }
}

/// Resolve `(parent_dir, absolute_path)` for `path`.
///
/// The parent directory is canonicalized when it exists so paths compare
/// equal to what the OS notifier reports.
pub fn file_parts(path: &Path) -> Result<(PathBuf, PathBuf), WatchError> {
    let io_err = |source| WatchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let absolute = std::path::absolute(path).map_err(io_err)?;
    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return Err(WatchError::InvalidPath(path.to_path_buf()));
    };
    let parent = std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
    let absolute = parent.join(name);
    Ok((parent, absolute))
}

fn file_len(path: &Path) -> Result<u64, WatchError> {
    std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|source| WatchError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Read from `*offset` to end of file and advance `*offset` past it.
///
/// A file that shrank below `*offset` was truncated in place; the offset is
/// rebased to its new end and nothing is reported.
fn read_appended(path: &Path, offset: &mut u64) -> Result<Vec<u8>, WatchError> {
    let io_err = |source| WatchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len < *offset {
        log::info!("{} truncated from {} to {len} bytes", path.display(), *offset);
        *offset = len;
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(*offset)).map_err(io_err)?;
    let mut diff = Vec::new();
    file.read_to_end(&mut diff).map_err(io_err)?;
    *offset += diff.len() as u64;
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    type Seen = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

    fn recording_handler(seen: &Seen) -> EventHandler {
        let seen = Arc::clone(seen);
        Arc::new(move |source: &str, diff: &[u8]| {
            seen.lock().unwrap().push((source.to_string(), diff.to_vec()));
        })
    }

    fn append(path: &Path, data: &[u8]) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(data).unwrap();
        file.sync_all().unwrap();
    }

    #[test]
    fn test_generic_source_registers_handler() {
        let source = GenericSource::new("test");
        source.on_change(Arc::new(|_: &str, _: &[u8]| {}));
        assert_eq!(source.handler_count(), 1);
    }

    #[test]
    fn test_generic_source_triggers_in_order() {
        let source = GenericSource::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            source.on_change(Arc::new(move |label: &str, diff: &[u8]| {
                assert_eq!(label, "test");
                assert_eq!(diff, b"trigger content");
                order.lock().unwrap().push(n);
            }));
        }
        source.trigger(b"trigger content");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_file_source_starts_at_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"existing history\n").unwrap();
        let source = FileSource::new(file.path()).unwrap();
        assert_eq!(source.offset(), 17);
    }

    #[test]
    fn test_file_source_reports_only_appended_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"old line\n").unwrap();
        let source = FileSource::new(file.path()).unwrap();
        let seen: Seen = Arc::default();
        source.on_change(recording_handler(&seen));

        append(file.path(), b"new line\n");
        source.on_notify(ChangeKind::Write).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, file.path().to_string_lossy());
        assert_eq!(seen[0].1, b"new line\n");
    }

    #[test]
    fn test_file_source_consecutive_diffs_have_no_gaps() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = FileSource::new(file.path()).unwrap();
        let seen: Seen = Arc::default();
        source.on_change(recording_handler(&seen));

        for chunk in [&b"a"[..], b"bc", b"def\n"] {
            append(file.path(), chunk);
            source.on_notify(ChangeKind::Write).unwrap();
        }

        let joined: Vec<u8> = seen.lock().unwrap().iter().flat_map(|(_, d)| d.clone()).collect();
        assert_eq!(joined, b"abcdef\n");
        assert_eq!(source.offset(), 7);
    }

    #[test]
    fn test_file_source_empty_diff_skips_handlers() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = FileSource::new(file.path()).unwrap();
        let seen: Seen = Arc::default();
        source.on_change(recording_handler(&seen));

        source.on_notify(ChangeKind::Write).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_file_source_ignores_other_kinds() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = FileSource::new(file.path()).unwrap();
        let seen: Seen = Arc::default();
        source.on_change(recording_handler(&seen));

        append(file.path(), b"data");
        source.on_notify(ChangeKind::Delete).unwrap();
        source.on_notify(ChangeKind::Other).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(source.offset(), 0);
    }

    #[test]
    fn test_file_source_create_rebaselines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"before rotation\n").unwrap();
        let source = FileSource::new(&path).unwrap();
        let seen: Seen = Arc::default();
        source.on_change(recording_handler(&seen));

        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"recreated content that must not replay\n").unwrap();
        source.on_notify(ChangeKind::Create).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        append(&path, b"after\n");
        source.on_notify(ChangeKind::Write).unwrap();
        assert_eq!(seen.lock().unwrap()[0].1, b"after\n");
    }

    #[test]
    fn test_file_source_truncation_rebases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let source = FileSource::new(file.path()).unwrap();
        let seen: Seen = Arc::default();
        source.on_change(recording_handler(&seen));

        file.as_file().set_len(2).unwrap();
        source.on_notify(ChangeKind::Write).unwrap();
        assert_eq!(source.offset(), 2);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_file_source_missing_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.log");
        let source = FileSource::new(&path).unwrap();
        assert_eq!(source.offset(), 0);

        let result = source.on_notify(ChangeKind::Write);
        assert!(matches!(result, Err(WatchError::Io { .. })));
    }

    #[test]
    fn test_file_parts_resolves_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        let (parent, abs) = file_parts(&path).unwrap();
        assert_eq!(abs, parent.join("x.log"));
        assert_eq!(parent, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_concurrent_notifications_do_not_duplicate() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = Arc::new(FileSource::new(file.path()).unwrap());
        let total = Arc::new(Mutex::new(0usize));
        {
            let total = Arc::clone(&total);
            source.on_change(Arc::new(move |_: &str, diff: &[u8]| {
                *total.lock().unwrap() += diff.len();
            }));
        }

        let mut appended = 0;
        for round in 0..20 {
            let line = format!("line {round}\n");
            append(file.path(), line.as_bytes());
            appended += line.len();
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let source = Arc::clone(&source);
                    std::thread::spawn(move || source.on_notify(ChangeKind::Write).unwrap())
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
        }

        assert_eq!(*total.lock().unwrap(), appended);
        assert_eq!(source.offset(), appended as u64);
    }
}
