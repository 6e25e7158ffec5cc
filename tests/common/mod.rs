//! Shared helpers for integration tests: an in-process WebSocket server.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Server side of one accepted connection.
pub type ServerSocket = WebSocketStream<TcpStream>;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Running mock server.
pub struct MockServer {
    /// Base URL, e.g. `ws://127.0.0.1:40123`.
    pub url: String,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    /// Number of WebSocket handshakes accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start a server that runs `handler(path, socket)` for every connection.
pub async fn serve<F, Fut>(handler: F) -> MockServer
where
    F: Fn(String, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let mut path = String::new();
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = req.uri().path().to_string();
                    Ok(resp)
                };
                let accepted = tokio_tungstenite::accept_hdr_async(stream, callback).await;
                if let Ok(socket) = accepted {
                    counter.fetch_add(1, Ordering::SeqCst);
                    handler(path, socket).await;
                }
            });
        }
    });

    MockServer {
        url: format!("ws://{addr}"),
        connections,
    }
}

/// Next data payload from the client, skipping control frames.
pub async fn next_payload(socket: &mut ServerSocket) -> Option<Vec<u8>> {
    while let Some(Ok(message)) = socket.next().await {
        match message {
            Message::Binary(data) => return Some(data.to_vec()),
            Message::Text(text) => return Some(text.as_bytes().to_vec()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Send a text message.
pub async fn send_text(socket: &mut ServerSocket, text: &str) {
    socket.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Send a binary message.
pub async fn send_binary(socket: &mut ServerSocket, data: Vec<u8>) {
    socket.send(Message::Binary(data.into())).await.unwrap();
}

/// Close with `code` and `reason`, then drain until the client hangs up.
pub async fn close_with(socket: &mut ServerSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    };
    let _ = socket.close(Some(frame)).await;
    drain(socket).await;
}

/// Read until the connection ends.
pub async fn drain(socket: &mut ServerSocket) {
    while let Some(Ok(_)) = socket.next().await {}
}
