//! Observer transport abstraction and the connection control protocol.
//!
//! The broadcast hub only needs two capabilities from an observer:
//! [`Observer::write_message`] and [`Observer::close`]. Two transports
//! provide them: a `WebSocket` connection ([`WsObserver`]) and an in-process
//! bounded channel ([`ChannelObserver`]) used by embedded consumers and
//! tests.
//!
//! Every frame in either direction is an [`Envelope`]:
//!
//! ```json
//! { "type": "alert", "data": { "alert_id": "...", "severity": "high" } }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DeliveryError;
use crate::ws::WsObserver;

/// Greeting sent to every observer before any broadcast.
pub const WELCOME_MESSAGE: &str = "Connected to Nexus Crisis Response WebSocket";

/// Features advertised in the greeting.
pub const WELCOME_FEATURES: [&str; 4] = [
    "real-time incident updates",
    "crisis alerts",
    "resource coordination",
    "volunteer notifications",
];

/// A tagged message exchanged with an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message tag (`alert`, `incident_update`, `pong`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Tag-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// The `connected` greeting.
    pub fn connected() -> Self {
        Self::new(
            "connected",
            serde_json::json!({
                "message": WELCOME_MESSAGE,
                "features": WELCOME_FEATURES,
            }),
        )
    }
}

/// Reply to a client control message, if it warrants one.
///
/// `ping` gets a `pong` carrying the server time in Unix seconds.
/// `subscribe` is acknowledged with `subscribed` echoing the request data;
/// it does not narrow what the observer receives. Anything else gets no
/// reply.
pub fn control_reply(message: &Envelope, now: DateTime<Utc>) -> Option<Envelope> {
    match message.kind.as_str() {
        "ping" => Some(Envelope::new(
            "pong",
            serde_json::json!({ "timestamp": now.timestamp() }),
        )),
        "subscribe" => Some(Envelope::new("subscribed", message.data.clone())),
        _ => None,
    }
}

/// Observer backed by a bounded in-process channel.
///
/// By default writes never wait: a full channel or a dropped receiver is a
/// delivery failure. An observer built with
/// [`ChannelObserver::with_write_timeout`] instead waits for room, up to the
/// timeout. Closing drops the sender so the receiver sees end-of-stream.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    write_timeout: Option<Duration>,
}

impl ChannelObserver {
    /// Create an observer and the receiver its messages arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        Self::build(capacity, None)
    }

    /// Create an observer whose writes wait up to `write_timeout` for the
    /// receiver to make room.
    pub fn with_write_timeout(
        capacity: usize,
        write_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        Self::build(capacity, Some(write_timeout))
    }

    fn build(
        capacity: usize,
        write_timeout: Option<Duration>,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Mutex::new(Some(tx)),
                write_timeout,
            },
            rx,
        )
    }

    fn sender(&self) -> Result<mpsc::Sender<Envelope>, DeliveryError> {
        let guard = self
            .sender
            .lock()
            .map_err(|e| DeliveryError::Transport(format!("sender lock poisoned: {e}")))?;
        guard.as_ref().cloned().ok_or(DeliveryError::Closed)
    }

    async fn write(&self, message: &Envelope) -> Result<(), DeliveryError> {
        let sender = self.sender()?;
        let Some(limit) = self.write_timeout else {
            return sender.try_send(message.clone()).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    DeliveryError::Transport("observer channel full".to_owned())
                }
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            });
        };
        sender
            .send_timeout(message.clone(), limit)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => DeliveryError::Timeout(limit),
                mpsc::error::SendTimeoutError::Closed(_) => DeliveryError::Closed,
            })
    }

    fn close(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }
}

/// A connected observer.
#[derive(Debug)]
pub enum Observer {
    /// A `WebSocket` client.
    WebSocket(WsObserver),
    /// An in-process channel consumer.
    Channel(ChannelObserver),
}

impl Observer {
    /// Deliver one envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] if the observer is closed, too slow, or
    /// its transport rejects the write.
    pub async fn write_message(&self, message: &Envelope) -> Result<(), DeliveryError> {
        match self {
            Self::WebSocket(ws) => ws.write_message(message).await,
            Self::Channel(channel) => channel.write(message).await,
        }
    }

    /// Close the underlying transport. Safe to call more than once.
    pub async fn close(&self) {
        match self {
            Self::WebSocket(ws) => ws.close().await,
            Self::Channel(channel) => channel.close(),
        }
        debug!(transport = self.transport(), "observer closed");
    }

    /// Short transport name for logs.
    pub const fn transport(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::Channel(_) => "channel",
        }
    }
}

impl From<ChannelObserver> for Observer {
    fn from(observer: ChannelObserver) -> Self {
        Self::Channel(observer)
    }
}

impl From<WsObserver> for Observer {
    fn from(observer: WsObserver) -> Self {
        Self::WebSocket(observer)
    }
}
