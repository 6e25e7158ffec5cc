//! Endpoint connections to the event-log server.
//!
//! A [`Connection`] binds one WebSocket to one logical endpoint
//! (`{base}/event`, `{base}/live`, `{base}/find`). It owns a receive task
//! that reads every inbound message, classifies it, and publishes it on an
//! unbounded channel:
//!
//! - the literal payload `ok` is a server ACK and is swallowed here,
//! - a JSON object `{"error": "..."}` becomes [`Inbound::ServerError`],
//! - anything else is handed upward as [`Inbound::Data`] for frame decoding.
//!
//! The channel ends when the socket closes. A normal close ends it quietly;
//! an abnormal close code or a read failure is published once as a terminal
//! entry first.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;

use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Literal ACK payload sent by the server after a filter or event.
const ACK: &[u8] = b"ok";

/// Logical server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Publish events.
    Event,
    /// Subscribe to real-time matches; the server never closes.
    Live,
    /// Bounded historical query; the server closes when done.
    Find,
}

impl Endpoint {
    /// Path segment appended to the base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Live => "live",
            Self::Find => "find",
        }
    }

    /// Full endpoint URL for `base_url`.
    pub fn url(self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.path())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Errors opening or using a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL cannot form a WebSocket request.
    #[error("invalid endpoint URL {url}: {source}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Underlying request-building error.
        #[source]
        source: tungstenite::Error,
    },
    /// Handshake or socket connect failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Endpoint URL.
        url: String,
        /// Underlying error.
        #[source]
        source: tungstenite::Error,
    },
    /// Writing a message failed.
    #[error("failed to send to {url}: {source}")]
    Send {
        /// Endpoint URL.
        url: String,
        /// Underlying error.
        #[source]
        source: tungstenite::Error,
    },
    /// The connection was closed by either side.
    #[error("connection to {0} is closed")]
    Closed(String),
    /// The inbound stream has already been handed to another consumer.
    #[error("inbound stream of {0} is already in use")]
    StreamTaken(String),
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Payload to decode as an event frame.
    Data(Vec<u8>),
    /// Server-reported error message.
    ServerError(String),
    /// Peer closed with a non-normal close code. Terminal.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Reading from the socket failed. Terminal.
    Failed(String),
}

/// What a single inbound payload is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Server acknowledgement.
    Ack,
    /// `{"error": "..."}` report.
    ServerError(String),
    /// Anything else.
    Data,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerErrorBody {
    error: String,
}

/// Classify an inbound payload.
pub fn classify(payload: &[u8]) -> Classified {
    if payload == ACK {
        return Classified::Ack;
    }
    if payload.trim_ascii_start().first() == Some(&b'{') {
        if let Ok(body) = serde_json::from_slice::<ServerErrorBody>(payload) {
            return Classified::ServerError(body.error);
        }
    }
    Classified::Data
}

/// One open WebSocket to one endpoint.
pub struct Connection {
    endpoint: Endpoint,
    url: String,
    writer: tokio::sync::Mutex<WsWriter>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    /// Cleared by the receive task when the socket is gone.
    alive: Arc<AtomicBool>,
    /// Set by the receive task before it ends on a read failure or an
    /// abnormal close code.
    failed: Arc<AtomicBool>,
    /// Set once by [`Connection::close`].
    closing: AtomicBool,
    receive_task: JoinHandle<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("url", &self.url)
            .field("alive", &self.alive.load(Ordering::Relaxed))
            .field("failed", &self.failed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect to `endpoint` under `base_url` and start the receive task.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn open(endpoint: Endpoint, base_url: &str) -> Result<Self, TransportError> {
        let url = endpoint.url(base_url);
        ws::validate_url(&url).map_err(|source| TransportError::InvalidUrl {
            url: url.clone(),
            source,
        })?;
        let (writer, reader) = ws::connect(&url)
            .await
            .map_err(|source| TransportError::Connect {
                url: url.clone(),
                source,
            })?;
        log::debug!("Opened connection to {url}");

        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let receive_task = tokio::spawn(run_receive_loop(
            reader,
            tx,
            Arc::clone(&alive),
            Arc::clone(&failed),
            url.clone(),
        ));

        Ok(Self {
            endpoint,
            url,
            writer: tokio::sync::Mutex::new(writer),
            inbound: Mutex::new(Some(rx)),
            alive,
            failed,
            closing: AtomicBool::new(false),
            receive_task,
        })
    }

    /// Endpoint this connection is bound to.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the socket is still usable for sending.
    pub fn is_open(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.closing.load(Ordering::Acquire)
    }

    /// Whether the connection ended with an error rather than a normal close.
    ///
    /// A failed connection stays failed; callers see its error instead of a
    /// silent reconnect.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Write one message.
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed(self.url.clone()));
        }
        let mut writer = self.writer.lock().await;
        writer
            .send_binary(data)
            .await
            .map_err(|source| TransportError::Send {
                url: self.url.clone(),
                source,
            })
    }

    /// Take the inbound message stream. Only one consumer may hold it.
    pub fn take_inbound(&self) -> Result<mpsc::UnboundedReceiver<Inbound>, TransportError> {
        self.inbound
            .lock()
            .expect("connection inbound mutex poisoned")
            .take()
            .ok_or_else(|| TransportError::StreamTaken(self.url.clone()))
    }

    /// Send a close notice with `reason` and release the socket.
    ///
    /// Only the first call does anything; later calls return `Ok`.
    pub async fn close(&self, reason: &str) -> Result<(), TransportError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::debug!("Closing connection to {}: {reason}", self.url);

        let mut writer = self.writer.lock().await;
        match writer.send_close(reason).await {
            Ok(()) => {}
            Err(e) if ws::is_disconnect(&e) => return Ok(()),
            Err(source) => {
                return Err(TransportError::Send {
                    url: self.url.clone(),
                    source,
                })
            }
        }
        if let Err(e) = writer.close().await {
            log::debug!("Closing sink for {} failed: {e}", self.url);
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

/// Read the socket until it ends, publishing classified messages.
async fn run_receive_loop(
    mut reader: WsReader,
    tx: mpsc::UnboundedSender<Inbound>,
    alive: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    url: String,
) {
    while let Some(result) = reader.recv().await {
        let payload = match result {
            Ok(WsMessage::Binary(data)) => data,
            Ok(WsMessage::Text(text)) => text.into_bytes(),
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close { code, reason }) => {
                if code != ws::CLOSE_NORMAL && code != ws::CLOSE_NO_STATUS {
                    failed.store(true, Ordering::Release);
                    let _ = tx.send(Inbound::Closed { code, reason });
                }
                break;
            }
            Err(e) if ws::is_disconnect(&e) => break,
            Err(e) => {
                log::warn!("Read from {url} failed: {e}");
                failed.store(true, Ordering::Release);
                let _ = tx.send(Inbound::Failed(e.to_string()));
                break;
            }
        };

        // Send errors only mean nobody is listening; keep draining the socket.
        let _ = match classify(&payload) {
            Classified::Ack => continue,
            Classified::ServerError(message) => tx.send(Inbound::ServerError(message)),
            Classified::Data => tx.send(Inbound::Data(payload)),
        };
    }

    alive.store(false, Ordering::Release);
    log::debug!("Connection to {url} ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(Endpoint::Event.url("ws://localhost:6433"), "ws://localhost:6433/event");
        assert_eq!(Endpoint::Live.url("ws://localhost:6433/"), "ws://localhost:6433/live");
        assert_eq!(Endpoint::Find.to_string(), "find");
    }

    #[test]
    fn test_classify_ack() {
        assert_eq!(classify(b"ok"), Classified::Ack);
    }

    #[test]
    fn test_classify_ok_prefix_is_data() {
        assert_eq!(classify(b"okay"), Classified::Data);
    }

    #[test]
    fn test_classify_server_error() {
        assert_eq!(
            classify(br#"{"error": "invalid filter"}"#),
            Classified::ServerError("invalid filter".to_string())
        );
    }

    #[test]
    fn test_classify_json_with_other_keys_is_data() {
        assert_eq!(classify(br#"{"error": "x", "code": 3}"#), Classified::Data);
        assert_eq!(classify(br#"{"status": "x"}"#), Classified::Data);
    }

    #[test]
    fn test_classify_frame_is_data() {
        assert_eq!(classify(b"event:0 0 0\n"), Classified::Data);
    }

    #[tokio::test]
    async fn test_open_unreachable_returns_connect_error() {
        let result = Connection::open(Endpoint::Event, "ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_open_invalid_url_returns_invalid_url() {
        let result = Connection::open(Endpoint::Find, "no scheme here").await;
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }
}
