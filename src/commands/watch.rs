//! `tailship watch`: tail files and publish every append as an event.
//!
//! ```bash
//! tailship watch --file /var/log/app.log --file /var/log/worker.log --tag prod
//! ```
//!
//! Diffs are handed from the watch daemon's blocking tasks to this command
//! over a channel and published in arrival order on the client's `event`
//! connection. Runs until `shutdown` resolves, then stops the daemon,
//! publishes whatever was already queued, and closes the connection.

// Rust guideline compliant 2026-02

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::publish::build_event;
use crate::event::Event;
use crate::transport::{Endpoint, TransportError};
use crate::watcher::{EventHandler, EventSource, FileSource, WatchDaemon};
use crate::Client;

/// Counters reported when a watch session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    /// Events accepted by the transport.
    pub published: usize,
    /// Events the transport refused.
    pub failed: usize,
    /// Notifications whose file could not be read.
    pub read_errors: usize,
}

impl WatchSummary {
    fn record(&mut self, event: &Event, result: Result<(), TransportError>) {
        match result {
            Ok(()) => self.published += 1,
            Err(e) => {
                log::error!("Failed to publish event from {}: {e}", event.source);
                self.failed += 1;
            }
        }
    }
}

/// Handler turning each diff into a tagged event on `tx`.
pub fn publish_handler(tx: mpsc::UnboundedSender<Event>, tags: Vec<String>) -> EventHandler {
    Arc::new(move |source: &str, diff: &[u8]| {
        // Receiver gone means the session is shutting down.
        let _ = tx.send(build_event(source, &tags, diff.to_vec()));
    })
}

/// Tail `files` and publish appends through `client` until `shutdown` resolves.
pub async fn run<F>(
    client: &Client,
    files: &[PathBuf],
    tags: &[String],
    shutdown: F,
) -> Result<WatchSummary>
where
    F: Future<Output = Result<()>>,
{
    anyhow::ensure!(!files.is_empty(), "No file to watch (use --file)");

    let daemon = WatchDaemon::new().context("Failed to create file watcher")?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    for file in files {
        let source = FileSource::new(file)
            .with_context(|| format!("Cannot watch {}", file.display()))?;
        source.on_change(publish_handler(tx.clone(), tags.to_vec()));
        let name = source.label().to_string();
        daemon
            .add_source(name, Arc::new(source))
            .with_context(|| format!("Cannot watch {}", file.display()))?;
    }
    drop(tx);

    let mut errors = daemon
        .take_errors()
        .context("Watch error channel already taken")?;
    daemon.start().context("Failed to start file watcher")?;
    log::info!(
        "Tailing {} file(s), publishing to {}",
        daemon.len(),
        client.base_url()
    );

    let mut summary = WatchSummary::default();
    tokio::pin!(shutdown);
    let outcome = loop {
        tokio::select! {
            res = &mut shutdown => break res,
            Some(event) = rx.recv() => {
                let result = client.send(&event).await;
                summary.record(&event, result);
            }
            Some(e) = errors.recv() => {
                log::debug!("Skipped notification: {e}");
                summary.read_errors += 1;
            }
        }
    };

    log::info!("Stopping watch");
    daemon.stop().await.context("Failed to stop file watcher")?;
    // Sources own the remaining senders; dropping them ends the queue.
    drop(daemon);
    while let Some(event) = rx.recv().await {
        let result = client.send(&event).await;
        summary.record(&event, result);
    }

    if let Err(e) = client.close(Endpoint::Event, "watch stopped").await {
        log::warn!("Failed to close event connection: {e}");
    }
    log::info!(
        "Published {} event(s), {} failed, {} unreadable notification(s)",
        summary.published,
        summary.failed,
        summary.read_errors
    );

    outcome.map(|()| summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_handler_builds_tagged_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = publish_handler(tx, vec!["prod".to_string()]);
        handler("/var/log/app.log", &b"line\n"[..]);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.source, "/var/log/app.log");
        assert_eq!(event.content, b"line\n");
        assert_eq!(event.tags, Some(vec!["prod".to_string()]));
        assert!(!event.id.is_empty());
    }

    #[test]
    fn test_publish_handler_without_tags() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        publish_handler(tx, Vec::new())("src", &b"x"[..]);
        assert_eq!(rx.try_recv().unwrap().tags, None);
    }

    #[tokio::test]
    async fn test_run_requires_a_file() {
        let client = Client::new("ws://127.0.0.1:1");
        let err = run(&client, &[], &[], async { Ok(()) }).await.unwrap_err();
        assert!(err.to_string().contains("No file to watch"));
    }
}
