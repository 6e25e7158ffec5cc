//! Tailship - log-shipping agent and client.
//!
//! Tails files for appended content, frames each append as an [`Event`],
//! and streams it to an event-log server over WebSockets. The same wire
//! protocol queries the server for past or live events.
//!
//! # Architecture
//!
//! - **Codec** - [`event`] frames, [`filter`] JSON
//! - **Transport** - [`ws`] socket halves, [`transport`] endpoint connections
//! - **Client** - [`client`] multiplexes one connection per endpoint into
//!   ordered response streams
//! - **Watcher** - [`watcher`] tails files driven by OS notifications
//!
//! # Modules
//!
//! - [`commands`] - CLI subcommands built on the above
//! - [`config`] - Configuration loading
//! - [`output`] - Human-readable event templates

// Rust guideline compliant 2026-02

// Library modules
pub mod client;
pub mod commands;
pub mod event;
pub mod filter;
pub mod transport;
pub mod watcher;
pub mod ws;

pub mod config;
pub mod output;

// Re-export commonly used types
pub use client::{Client, EventResponse, EventStream, ResponseError};
pub use config::Config;
pub use event::{Event, FrameError};
pub use filter::{EventFilter, Order};
pub use transport::{Endpoint, TransportError};
pub use watcher::{EventSource, FileSource, GenericSource, WatchDaemon, WatchError, WatchedSource};
