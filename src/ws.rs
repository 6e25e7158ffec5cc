//! Shared WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves. [`crate::transport`] builds endpoint connections
//! on top of this module rather than using `tokio-tungstenite` directly.
//!
//! [`connect`] handles URL→request building and TLS negotiation and returns
//! a ([`WsWriter`], [`WsReader`]) pair: the reader is moved into the
//! connection's receive task while the writer stays behind a lock for sends.

// Rust guideline compliant 2026-02

use std::borrow::Cow;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Close code sent when the peer closes without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Normal closure close code.
pub const CLOSE_NORMAL: u16 = 1000;

/// Received WebSocket message.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a binary frame.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), tungstenite::Error> {
        self.sink
            .send(tungstenite::Message::Binary(data.to_vec()))
            .await
    }

    /// Send a normal-closure close frame carrying `reason`.
    pub async fn send_close(&mut self, reason: &str) -> Result<(), tungstenite::Error> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Owned(reason.to_string()),
        };
        self.sink
            .send(tungstenite::Message::Close(Some(frame)))
            .await
    }

    /// Flush pending writes and close the sink.
    pub async fn close(&mut self) -> Result<(), tungstenite::Error> {
        self.sink.close().await
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next message, returning `None` when the stream ends.
    ///
    /// Raw `Frame` variants are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsMessage, tungstenite::Error>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e)),
            };
            return Some(Ok(match message {
                tungstenite::Message::Text(text) => WsMessage::Text(text.to_string()),
                tungstenite::Message::Binary(data) => WsMessage::Binary(data.to_vec()),
                tungstenite::Message::Ping(data) => WsMessage::Ping(data.to_vec()),
                tungstenite::Message::Pong(data) => WsMessage::Pong(data.to_vec()),
                tungstenite::Message::Close(close_frame) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    WsMessage::Close { code, reason }
                }
                // Raw frames are never surfaced when reading.
                tungstenite::Message::Frame(_) => continue,
            }));
        }
    }
}

/// Whether a read error just means the socket went away.
///
/// These end a stream quietly; anything else is a transport failure.
pub fn is_disconnect(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
            )
    )
}

/// Connect to a WebSocket URL.
///
/// Builds an HTTP request from `url` then performs the WebSocket handshake.
/// Returns split (writer, reader) halves for independent use.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader), tungstenite::Error> {
    use tungstenite::client::IntoClientRequest;

    let request = url.into_client_request()?;
    let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Check that `url` can form a WebSocket handshake request.
pub fn validate_url(url: &str) -> Result<(), tungstenite::Error> {
    use tungstenite::client::IntoClientRequest;

    url.into_client_request().map(|_| ())
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
