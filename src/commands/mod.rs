//! CLI subcommand implementations for tailship.
//!
//! - [`watch`] - tail files and publish appended content
//! - [`query`] - print past or live events
//! - [`publish`] - publish a single event
//!
//! Commands take an already-configured [`crate::Client`]; flag parsing and
//! config resolution stay in the binary.

// Rust guideline compliant 2026-02

pub mod publish;
pub mod query;
pub mod watch;

use anyhow::{Context, Result};

/// Resolve when the process is asked to stop (SIGINT, SIGTERM or SIGHUP).
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut hup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
            _ = term.recv() => log::info!("Received SIGTERM"),
            _ = hup.recv() => log::info!("Received SIGHUP"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    Ok(())
}
