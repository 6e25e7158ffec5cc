//! Watch daemon: source registry plus the notification dispatch loop.
//!
//! # Architecture
//!
//! ```text
//! OS notifier ──► raw channel ──► dispatch loop (tokio task)
//!                                   │ lookup by parent dir + exact path
//!                                   ▼
//!                     spawn_blocking(source.on_notify(kind)) per match
//! ```
//!
//! Change notifications are directory scoped, so the registry keeps sources
//! both by name and by parent directory. A directory is subscribed when its
//! first source is added and unsubscribed when its last source is removed.
//!
//! The daemon moves `Created → Started → Stopped`. Stopping drops the
//! notifier, which closes the raw channel and ends the dispatch loop; `stop`
//! returns once the loop has confirmed it exited. A stopped daemon cannot be
//! restarted.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use super::notifier::{Change, Notifier, RawEvent};
use super::source::WatchedSource;
use super::WatchError;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Started,
    Stopped,
}

/// Shared mutable state of the daemon. Locked only for map access.
struct Registry {
    state: State,
    sources: HashMap<String, Arc<dyn WatchedSource>>,
    dirs: HashMap<PathBuf, Vec<(String, Arc<dyn WatchedSource>)>>,
    /// `None` once stopped.
    notifier: Option<Notifier>,
    /// Handed to the dispatch loop on start.
    raw_rx: Option<mpsc::UnboundedReceiver<RawEvent>>,
    /// Fired by the dispatch loop on exit.
    done_rx: Option<oneshot::Receiver<()>>,
}

impl Registry {
    /// Sources whose path is exactly `path`.
    fn matching(&self, path: &Path) -> Vec<Arc<dyn WatchedSource>> {
        let Some(dir) = path.parent() else {
            return Vec::new();
        };
        self.dirs
            .get(dir)
            .map(|sources| {
                sources
                    .iter()
                    .filter(|(_, source)| source.path() == path)
                    .map(|(_, source)| Arc::clone(source))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Tails registered sources and dispatches their change notifications.
pub struct WatchDaemon {
    registry: Arc<Mutex<Registry>>,
    errors_tx: mpsc::UnboundedSender<WatchError>,
    errors_rx: Mutex<Option<mpsc::UnboundedReceiver<WatchError>>>,
}

impl std::fmt::Debug for WatchDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock().expect("watch registry mutex poisoned");
        f.debug_struct("WatchDaemon")
            .field("state", &registry.state)
            .field("sources", &registry.sources.keys().collect::<Vec<_>>())
            .field("dirs", &registry.dirs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WatchDaemon {
    /// Create a daemon with an OS notifier and no sources.
    pub fn new() -> Result<Self, WatchError> {
        let (notifier, raw_rx) = Notifier::new()?;
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Ok(Self {
            registry: Arc::new(Mutex::new(Registry {
                state: State::Created,
                sources: HashMap::new(),
                dirs: HashMap::new(),
                notifier: Some(notifier),
                raw_rx: Some(raw_rx),
                done_rx: None,
            })),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
        })
    }

    /// Register `source` under `name`.
    ///
    /// Re-adding an existing name returns the registered source unchanged.
    /// The source's parent directory is subscribed if no other source lives
    /// there yet.
    pub fn add_source(
        &self,
        name: impl Into<String>,
        source: Arc<dyn WatchedSource>,
    ) -> Result<Arc<dyn WatchedSource>, WatchError> {
        let name = name.into();
        let mut registry = self.registry.lock().expect("watch registry mutex poisoned");
        if registry.state == State::Stopped {
            return Err(WatchError::Stopped);
        }
        if let Some(existing) = registry.sources.get(&name) {
            return Ok(Arc::clone(existing));
        }

        let dir = source.parent_dir().to_path_buf();
        if !registry.dirs.contains_key(&dir) {
            if let Some(notifier) = registry.notifier.as_mut() {
                notifier.watch_dir(&dir)?;
            }
        }

        registry
            .dirs
            .entry(dir)
            .or_default()
            .push((name.clone(), Arc::clone(&source)));
        registry.sources.insert(name.clone(), Arc::clone(&source));
        log::debug!("Added source {name:?} ({})", source.path().display());
        Ok(source)
    }

    /// Unregister the source named `name` and return it.
    ///
    /// Unsubscribes its directory when no other source remains there.
    pub fn remove_source(&self, name: &str) -> Result<Arc<dyn WatchedSource>, WatchError> {
        let mut registry = self.registry.lock().expect("watch registry mutex poisoned");
        let source = registry
            .sources
            .remove(name)
            .ok_or_else(|| WatchError::UnknownSource(name.to_string()))?;

        let dir = source.parent_dir().to_path_buf();
        let now_empty = registry.dirs.get_mut(&dir).is_some_and(|sources| {
            sources.retain(|(n, _)| n != name);
            sources.is_empty()
        });
        if now_empty {
            registry.dirs.remove(&dir);
            if let Some(notifier) = registry.notifier.as_mut() {
                if let Err(e) = notifier.unwatch_dir(&dir) {
                    log::warn!("Failed to unwatch {}: {e}", dir.display());
                }
            }
        }
        log::debug!("Removed source {name:?}");
        Ok(source)
    }

    /// Source registered under `name`.
    pub fn source(&self, name: &str) -> Option<Arc<dyn WatchedSource>> {
        self.registry
            .lock()
            .expect("watch registry mutex poisoned")
            .sources
            .get(name)
            .map(Arc::clone)
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .expect("watch registry mutex poisoned")
            .sources
            .len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directories currently subscribed with the notifier.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.registry
            .lock()
            .expect("watch registry mutex poisoned")
            .dirs
            .keys()
            .cloned()
            .collect()
    }

    /// Take the channel on which per-notification errors are reported.
    ///
    /// Errors are logged regardless; only the first caller gets the channel.
    pub fn take_errors(&self) -> Option<mpsc::UnboundedReceiver<WatchError>> {
        self.errors_rx
            .lock()
            .expect("watch errors mutex poisoned")
            .take()
    }

    /// Launch the dispatch loop on the current tokio runtime.
    pub fn start(&self) -> Result<(), WatchError> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Err(WatchError::NoRuntime);
        };

        let mut registry = self.registry.lock().expect("watch registry mutex poisoned");
        match registry.state {
            State::Created => {}
            State::Started => return Err(WatchError::AlreadyStarted),
            State::Stopped => return Err(WatchError::Stopped),
        }
        let Some(raw_rx) = registry.raw_rx.take() else {
            return Err(WatchError::Stopped);
        };

        let (done_tx, done_rx) = oneshot::channel();
        registry.done_rx = Some(done_rx);
        registry.state = State::Started;
        drop(registry);

        handle.spawn(run_dispatch_loop(
            raw_rx,
            Arc::clone(&self.registry),
            self.errors_tx.clone(),
            done_tx,
        ));
        log::info!("Watch daemon started");
        Ok(())
    }

    /// Close the notifier and wait for the dispatch loop to exit.
    pub async fn stop(&self) -> Result<(), WatchError> {
        let (notifier, done_rx) = {
            let mut registry = self.registry.lock().expect("watch registry mutex poisoned");
            match registry.state {
                State::Started => {}
                State::Created => return Err(WatchError::NotStarted),
                State::Stopped => return Err(WatchError::Stopped),
            }
            registry.state = State::Stopped;
            (registry.notifier.take(), registry.done_rx.take())
        };

        // Dropping the OS watcher drops the raw sender, ending the loop.
        drop(notifier);
        if let Some(done_rx) = done_rx {
            let _ = done_rx.await;
        }
        log::info!("Watch daemon stopped");
        Ok(())
    }
}

/// Drain raw notifications until the notifier goes away.
async fn run_dispatch_loop(
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    registry: Arc<Mutex<Registry>>,
    errors: mpsc::UnboundedSender<WatchError>,
    done: oneshot::Sender<()>,
) {
    while let Some(result) = raw_rx.recv().await {
        match result {
            Ok(event) => {
                for change in Notifier::changes(&event) {
                    dispatch(&registry, change, &errors);
                }
            }
            Err(e) => {
                log::warn!("File notifier error: {e}");
                let _ = errors.send(WatchError::Notifier(e));
            }
        }
    }
    log::debug!("Watch dispatch loop exited");
    let _ = done.send(());
}

/// Run `on_notify` for every source matching `change` on its own blocking task.
fn dispatch(
    registry: &Mutex<Registry>,
    change: Change,
    errors: &mpsc::UnboundedSender<WatchError>,
) {
    let matches = registry
        .lock()
        .expect("watch registry mutex poisoned")
        .matching(&change.path);

    for source in matches {
        let errors = errors.clone();
        let kind = change.kind;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = source.on_notify(kind) {
                log::warn!("{e}");
                let _ = errors.send(e);
            }
        });
    }
}
