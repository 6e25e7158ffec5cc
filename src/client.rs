//! Streaming client for the event-log server.
//!
//! [`Client`] keeps at most one [`Connection`] per [`Endpoint`], opened on
//! first use and reused while it is open. A connection that ended normally
//! (a finished `find`, a closed stream) is replaced on the next call. One
//! that failed is returned as-is so its error surfaces to the caller; the
//! client never reconnects on its own. [`Client::close`] drops a connection
//! so the next call opens a fresh one.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tailship::transport::TransportError> {
//! use tailship::{Client, EventFilter, EventResponse};
//!
//! let client = Client::new("ws://localhost:6433");
//! let mut results = client.find(&EventFilter::since(10.0)).await?;
//! while let Some(response) = results.recv().await {
//!     match response {
//!         EventResponse::Event(event) => println!("{}", event.content_lossy()),
//!         EventResponse::Error(e) => eprintln!("{e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Rust guideline compliant 2026-02

use std::borrow::Cow;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::{new_event_id, Event, FrameError};
use crate::filter::EventFilter;
use crate::transport::{Connection, Endpoint, Inbound, TransportError};

/// One item of a response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResponse {
    /// A decoded event.
    Event(Event),
    /// A per-item or terminal failure, in arrival order.
    Error(ResponseError),
}

impl EventResponse {
    /// The event, if this response carries one.
    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Error(_) => None,
        }
    }
}

/// Errors delivered in-band on a response stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The frame could not be decoded. The stream continues.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The server reported an error. The stream continues.
    #[error("server error: {0}")]
    Server(String),
    /// The socket failed. Terminal.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server closed with a non-normal code. Terminal.
    #[error("connection closed ({code}): {reason}")]
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl From<Inbound> for EventResponse {
    fn from(inbound: Inbound) -> Self {
        match inbound {
            Inbound::Data(payload) => match Event::decode(&payload) {
                Ok(event) => Self::Event(event),
                Err(e) => Self::Error(e.into()),
            },
            Inbound::ServerError(message) => Self::Error(ResponseError::Server(message)),
            Inbound::Closed { code, reason } => Self::Error(ResponseError::Closed { code, reason }),
            Inbound::Failed(message) => Self::Error(ResponseError::Transport(message)),
        }
    }
}

/// Ordered stream of responses from a `find` or `live` connection.
///
/// Ends when the underlying connection closes. Implements
/// [`futures_util::Stream`]; [`EventStream::recv`] is the same without the
/// trait import.
pub struct EventStream {
    connection: Arc<Connection>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("endpoint", &self.connection.endpoint())
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Next response, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<EventResponse> {
        self.inbound.recv().await.map(EventResponse::from)
    }

    /// Endpoint feeding this stream.
    pub fn endpoint(&self) -> Endpoint {
        self.connection.endpoint()
    }

    /// Close the connection; the stream ends once the server acknowledges.
    pub async fn close(&self, reason: &str) -> Result<(), TransportError> {
        self.connection.close(reason).await
    }
}

impl futures_util::Stream for EventStream {
    type Item = EventResponse;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .inbound
            .poll_recv(cx)
            .map(|item| item.map(EventResponse::from))
    }
}

/// Client to one event-log server.
pub struct Client {
    base_url: String,
    connections: Mutex<HashMap<Endpoint, Arc<Connection>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client for the server at `base_url` (e.g. `ws://localhost:6433`).
    ///
    /// No connection is opened until the first operation.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Existing connection for `endpoint`, or a newly opened one.
    ///
    /// A connection that ended normally (server finished, or closed by us) is
    /// replaced. One that failed is returned so its error surfaces. The map
    /// lock is never held across the handshake.
    async fn connection(&self, endpoint: Endpoint) -> Result<Arc<Connection>, TransportError> {
        if let Some(existing) = self.current(endpoint) {
            return Ok(existing);
        }

        let opened = Arc::new(Connection::open(endpoint, &self.base_url).await?);
        let raced = {
            let mut connections = self.connections.lock().expect("client connections mutex poisoned");
            let existing = connections
                .get(&endpoint)
                .filter(|existing| is_usable(existing))
                .map(Arc::clone);
            if existing.is_none() {
                connections.insert(endpoint, Arc::clone(&opened));
            }
            existing
        };

        if let Some(existing) = raced {
            // Another caller opened this endpoint during our handshake.
            if let Err(e) = opened.close("duplicate connection").await {
                log::debug!("Closing duplicate {endpoint} connection failed: {e}");
            }
            return Ok(existing);
        }
        if endpoint == Endpoint::Event {
            spawn_publish_drain(&opened)?;
        }
        Ok(opened)
    }

    /// Registered connection for `endpoint`, unless it ended normally.
    fn current(&self, endpoint: Endpoint) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock().expect("client connections mutex poisoned");
        let existing = connections.get(&endpoint).map(Arc::clone)?;
        if is_usable(&existing) {
            return Some(existing);
        }
        log::debug!("Replacing finished {endpoint} connection");
        connections.remove(&endpoint);
        None
    }

    /// Publish `event` on the `event` endpoint.
    ///
    /// Does not wait for the server's ACK. An event with an empty id is sent
    /// with a freshly generated one.
    pub async fn send(&self, event: &Event) -> Result<(), TransportError> {
        let connection = self.connection(Endpoint::Event).await?;
        let event = if event.id.is_empty() {
            Cow::Owned(Event {
                id: new_event_id(),
                ..event.clone()
            })
        } else {
            Cow::Borrowed(event)
        };
        connection.send(&event.encode()).await
    }

    /// Query past events. The stream ends when the server closes the
    /// connection after the last result.
    pub async fn find(&self, filter: &EventFilter) -> Result<EventStream, TransportError> {
        self.subscribe(Endpoint::Find, filter).await
    }

    /// Subscribe to live events. The server never ends this stream; close it
    /// with [`EventStream::close`] or [`Client::close`].
    pub async fn receive(&self, filter: &EventFilter) -> Result<EventStream, TransportError> {
        self.subscribe(Endpoint::Live, filter).await
    }

    async fn subscribe(
        &self,
        endpoint: Endpoint,
        filter: &EventFilter,
    ) -> Result<EventStream, TransportError> {
        let connection = self.connection(endpoint).await?;
        if !connection.is_open() {
            return Err(TransportError::Closed(connection.url().to_string()));
        }
        let inbound = connection.take_inbound()?;
        connection.send(&filter.encode()).await?;
        Ok(EventStream {
            connection,
            inbound,
        })
    }

    /// Close and forget the connection for `endpoint`, if any.
    pub async fn close(&self, endpoint: Endpoint, reason: &str) -> Result<(), TransportError> {
        let connection = self
            .connections
            .lock()
            .expect("client connections mutex poisoned")
            .remove(&endpoint);
        match connection {
            Some(connection) => connection.close(reason).await,
            None => Ok(()),
        }
    }

    /// Close every open connection.
    pub async fn close_all(&self, reason: &str) {
        let connections: Vec<_> = self
            .connections
            .lock()
            .expect("client connections mutex poisoned")
            .drain()
            .collect();
        for (endpoint, connection) in connections {
            if let Err(e) = connection.close(reason).await {
                log::debug!("Closing {endpoint} connection failed: {e}");
            }
        }
    }
}

/// Open, or failed and kept so its error surfaces.
fn is_usable(connection: &Connection) -> bool {
    connection.is_open() || connection.has_failed()
}

/// Consume whatever the server sends back on the publish connection.
///
/// ACKs are already swallowed by the connection; server errors are logged.
fn spawn_publish_drain(connection: &Connection) -> Result<(), TransportError> {
    let mut inbound = connection.take_inbound()?;
    let url = connection.url().to_string();
    tokio::spawn(async move {
        while let Some(message) = inbound.recv().await {
            match message {
                Inbound::ServerError(message) => log::warn!("Server rejected event on {url}: {message}"),
                Inbound::Closed { code, reason } => {
                    log::warn!("Server closed {url} ({code}): {reason}");
                }
                Inbound::Failed(message) => log::warn!("Connection to {url} failed: {message}"),
                Inbound::Data(data) => {
                    log::debug!("Ignoring {} unexpected bytes on {url}", data.len());
                }
            }
        }
    });
    Ok(())
}
