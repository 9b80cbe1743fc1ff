//! WebSocket handler for live reload.
//!
//! Registers each client with the [`Broadcaster`] for the lifetime of its
//! connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, Notify};

use super::broadcast::{Broadcaster, Connection, ConnectionError};
use super::manager::LiveReloadState;

/// Sending half of a client WebSocket.
struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
    /// Wakes the receive loop when the server closes the connection.
    close_requested: Notify,
}

impl WsConnection {
    fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            close_requested: Notify::new(),
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, text: &str) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.close_requested.notify_one();
        self.sink
            .lock()
            .await
            .send(Message::Close(None))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<LiveReloadState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (sink, mut stream) = socket.split();
    let ws_connection = Arc::new(WsConnection::new(sink));
    let connection = Arc::clone(&ws_connection) as Arc<dyn Connection>;

    broadcaster.register(Arc::clone(&connection));
    tracing::debug!(clients = broadcaster.len(), "Live reload client connected");

    // Client messages only keep the connection alive
    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            () = ws_connection.close_requested.notified() => break,
        }
    }

    ws_connection.mark_closed();
    broadcaster.unregister(&connection);
    tracing::debug!(clients = broadcaster.len(), "Live reload client disconnected");
}
