//! Downstream domain event bus for the Nexus crisis-response service.
//!
//! Producers hand `{topic, key, payload}` to [`EventBus::publish`] and move
//! on. Delivery happens on a spawned task; serialization and publish
//! failures are logged at `warn` and never reach the caller.
//!
//! Topics are dotted event names (`incident.created`, `alert.broadcasted`,
//! ...). On NATS each event lands on the subject `{prefix}.{topic}` with a
//! JSON [`EventEnvelope`] body.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default subject prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "nexus.crisis";

/// Well-known topic names.
pub mod topics {
    /// A new incident was reported.
    pub const INCIDENT_CREATED: &str = "incident.created";
    /// An incident's status, severity or counts changed.
    pub const INCIDENT_UPDATED: &str = "incident.updated";
    /// An alert was handed to the broadcast hub.
    pub const ALERT_BROADCASTED: &str = "alert.broadcasted";
    /// An alert was superseded by a `Cancel` message.
    pub const ALERT_CANCELLED: &str = "alert.cancelled";
    /// A resource was deployed to an incident.
    pub const RESOURCE_DEPLOYED: &str = "resource.deployed";
    /// A volunteer registered.
    pub const VOLUNTEER_REGISTERED: &str = "volunteer.registered";
}

/// Errors raised while connecting the bus. Publishing never returns them.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The NATS connection could not be established.
    #[error("NATS connection failed: {0}")]
    Connect(String),
}

/// Body published for every domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Dotted event name.
    pub topic: String,
    /// Partition key, normally the record id.
    pub key: String,
    /// Event-specific payload.
    pub data: serde_json::Value,
    /// When the event was produced.
    pub published_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time.
    pub fn new(topic: &str, key: &str, data: serde_json::Value) -> Self {
        Self {
            topic: topic.to_owned(),
            key: key.to_owned(),
            data,
            published_at: Utc::now(),
        }
    }
}

/// Publishes envelopes to NATS.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    prefix: String,
}

impl NatsBus {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connect`] if the connection cannot be established.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, BusError> {
        info!(url, prefix, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self {
            client,
            prefix: prefix.to_owned(),
        })
    }

    /// Full subject for a topic.
    pub fn subject(&self, topic: &str) -> String {
        format!("{}.{topic}", self.prefix)
    }

    fn publish(&self, envelope: EventEnvelope) {
        let subject = self.subject(&envelope.topic);
        match serde_json::to_vec(&envelope) {
            Ok(payload) => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                        warn!(subject, error = %e, "failed to publish domain event");
                    } else {
                        debug!(subject, "published domain event");
                    }
                });
            }
            Err(e) => {
                warn!(subject, error = %e, "failed to serialize domain event");
            }
        }
    }
}

impl std::fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBus")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Keeps every published envelope in memory, in publish order.
#[derive(Debug, Clone, Default)]
pub struct RecordingBus {
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl RecordingBus {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Envelopes published on one topic.
    pub fn on_topic(&self, topic: &str) -> Vec<EventEnvelope> {
        self.events()
            .into_iter()
            .filter(|e| e.topic == topic)
            .collect()
    }

    fn record(&self, envelope: EventEnvelope) {
        if let Ok(mut events) = self.events.lock() {
            events.push(envelope);
        }
    }
}

/// The configured event bus.
#[derive(Debug, Clone)]
pub enum EventBus {
    /// Publish to NATS.
    Nats(NatsBus),
    /// Record in memory (tests).
    Recording(RecordingBus),
    /// Drop everything.
    Disabled,
}

impl EventBus {
    /// Fire-and-forget publish of a domain event. Never blocks on the
    /// network and never fails.
    pub fn publish(&self, topic: &str, key: &str, data: serde_json::Value) {
        let envelope = EventEnvelope::new(topic, key, data);
        match self {
            Self::Nats(bus) => bus.publish(envelope),
            Self::Recording(bus) => bus.record(envelope),
            Self::Disabled => debug!(topic, key, "event bus disabled, dropping event"),
        }
    }

    /// Short backend name for logs.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Nats(_) => "nats",
            Self::Recording(_) => "recording",
            Self::Disabled => "disabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_bus_keeps_publish_order() {
        let recorder = RecordingBus::new();
        let bus = EventBus::Recording(recorder.clone());
        bus.publish(topics::INCIDENT_CREATED, "a", serde_json::json!({"n": 1}));
        bus.publish(topics::ALERT_BROADCASTED, "b", serde_json::json!({"n": 2}));

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events.first().map(|e| e.topic.as_str()),
            Some("incident.created")
        );
        assert_eq!(recorder.on_topic(topics::ALERT_BROADCASTED).len(), 1);
    }

    #[test]
    fn disabled_bus_accepts_everything() {
        let bus = EventBus::Disabled;
        bus.publish(topics::VOLUNTEER_REGISTERED, "v", serde_json::Value::Null);
        assert_eq!(bus.backend(), "disabled");
    }

    #[test]
    fn envelope_serializes_topic_key_and_data() {
        let envelope = EventEnvelope::new("resource.deployed", "r-1", serde_json::json!({"q": 3}));
        let json = serde_json::to_value(&envelope).unwrap_or_default();
        assert_eq!(json.get("topic").and_then(|v| v.as_str()), Some("resource.deployed"));
        assert_eq!(json.get("key").and_then(|v| v.as_str()), Some("r-1"));
        assert!(json.get("published_at").is_some());
    }

    #[tokio::test]
    #[ignore = "requires live NATS server (docker compose up -d)"]
    async fn nats_subject_uses_prefix() {
        let bus = NatsBus::connect("nats://localhost:4222", DEFAULT_TOPIC_PREFIX).await;
        let Ok(bus) = bus else {
            return;
        };
        assert_eq!(bus.subject("alert.cancelled"), "nexus.crisis.alert.cancelled");
    }
}
