//! `WebSocket` observer transport.
//!
//! Clients connect to `GET /api/v1/crisis/ws`. The server greets them with a
//! `connected` message, registers them with the [`ObserverRegistry`], and
//! from then on pushes every broadcast event. Client frames are control
//! messages (`ping`, `subscribe`). Protocol-level ping frames are answered
//! by the transport itself.
//!
//! [`ObserverRegistry`]: crate::registry::ObserverRegistry

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::{Envelope, Observer, control_reply};
use crate::error::{ApiError, DeliveryError};
use crate::state::AppState;

/// Write half of one `WebSocket` connection.
///
/// Writes are serialized through a mutex and bounded by `write_timeout`; a
/// write that does not finish in time is a delivery failure.
pub struct WsObserver {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    write_timeout: Duration,
    closed: AtomicBool,
}

impl WsObserver {
    /// Wrap the write half of a socket.
    pub fn new(sink: SplitSink<WebSocket, Message>, write_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            write_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Send one envelope as a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] if the socket is closed, the write times
    /// out, or the transport fails.
    pub async fn write_message(&self, message: &Envelope) -> Result<(), DeliveryError> {
        let json = serde_json::to_string(message)?;
        self.send(Message::Text(json.into())).await
    }

    async fn send(&self, frame: Message) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeliveryError::Transport(e.to_string())),
            Err(elapsed) => {
                debug!(error = %elapsed, "WebSocket write timed out");
                Err(DeliveryError::Timeout(self.write_timeout))
            }
        }
    }

    /// Send a close frame and refuse further writes.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

impl std::fmt::Debug for WsObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsObserver")
            .field("write_timeout", &self.write_timeout)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Upgrade to a `WebSocket` observer connection.
///
/// # Route
///
/// `GET /api/v1/crisis/ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if !state.config.realtime.ws_enabled {
        return ApiError::Unavailable("real-time updates are disabled".to_owned()).into_response();
    }
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Connection lifecycle: greet, register, serve control messages until the
/// client leaves, then unregister and close.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let timeout = Duration::from_millis(state.config.realtime.write_timeout_ms);
    let observer = Arc::new(Observer::WebSocket(WsObserver::new(sink, timeout)));

    if let Err(e) = observer.write_message(&Envelope::connected()).await {
        debug!(error = %e, "WebSocket client left before greeting");
        observer.close().await;
        return;
    }

    let handle = state.registry.register(Arc::clone(&observer)).await;
    let clients = state.registry.count().await;
    info!(connection = %handle, clients, "WebSocket client connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message = match serde_json::from_str::<Envelope>(text.as_str()) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(connection = %handle, error = %e, "ignoring malformed client message");
                        continue;
                    }
                };
                match control_reply(&message, Utc::now()) {
                    Some(reply) => {
                        if observer.write_message(&reply).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!(connection = %handle, message_type = %message.kind, "unknown message type");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            // Pings are answered by the transport when the frame is read.
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %handle, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    state.registry.unregister(handle).await;
    observer.close().await;
    info!(connection = %handle, "WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;

    const fn assert_send<F: Future + Send>(_: &F) {}

    #[test]
    fn connection_task_can_run_on_the_multi_threaded_runtime() {
        let _ = |socket: WebSocket, state: Arc<AppState>| {
            let task = handle_ws(socket, state);
            assert_send(&task);
        };
    }
}
