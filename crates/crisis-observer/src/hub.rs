//! Broadcast hub: a bounded, lossy event queue and its single dispatcher.
//!
//! Producers call [`BroadcastHub::enqueue`] (or one of the typed helpers)
//! and return immediately. When the queue is full the event is dropped and
//! counted; producers never wait and never see an error.
//!
//! The [`Dispatcher`] owns the receiving end. For every event it takes a
//! fresh [`ObserverRegistry::snapshot`], writes to all observers
//! concurrently, and evicts and closes every observer whose write failed.
//! Events leave the queue in the order they were enqueued. On shutdown
//! ([`Dispatcher::run_until`]) the queue stops accepting events and the
//! ones already queued are delivered before the dispatcher returns.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crisis_types::{Alert, AlertId, IncidentId, ResourceId, VolunteerId};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::Envelope;
use crate::registry::ObserverRegistry;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The event is waiting for the dispatcher.
    Queued,
    /// The queue was full (or the dispatcher gone) and the event was
    /// discarded.
    Dropped,
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Observers that accepted the event.
    pub delivered: usize,
    /// Observers removed because their write failed.
    pub evicted: usize,
}

/// Producer side of the broadcast queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: mpsc::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl BroadcastHub {
    /// Create a hub with a queue of `capacity` events, returning the hub and
    /// the dispatcher that drains it.
    pub fn new(registry: Arc<ObserverRegistry>, capacity: usize) -> (Self, Dispatcher) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            Dispatcher { registry, receiver },
        )
    }

    /// Try to queue an event without waiting.
    pub fn enqueue(&self, event: Envelope) -> EnqueueOutcome {
        match self.sender.try_send(event) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.record_drop();
                warn!(event_type = %event.kind, dropped, "Broadcast channel full, dropping event");
                EnqueueOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                let dropped = self.record_drop();
                warn!(event_type = %event.kind, dropped, "Broadcast dispatcher stopped, dropping event");
                EnqueueOutcome::Dropped
            }
        }
    }

    fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// Events currently waiting for the dispatcher.
    pub fn queued_len(&self) -> usize {
        self.sender
            .max_capacity()
            .saturating_sub(self.sender.capacity())
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Events dropped since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Serialize `data` and queue it under `kind`. Serialization failures
    /// are logged and count as a drop.
    fn enqueue_serialized(&self, kind: &str, data: impl Serialize) -> EnqueueOutcome {
        match serde_json::to_value(data) {
            Ok(data) => self.enqueue(Envelope::new(kind, data)),
            Err(e) => {
                warn!(event_type = kind, error = %e, "failed to serialize broadcast payload");
                EnqueueOutcome::Dropped
            }
        }
    }

    /// Queue an `incident_update` event.
    pub fn broadcast_incident_update(
        &self,
        incident_id: IncidentId,
        action: &str,
        data: impl Serialize,
    ) -> EnqueueOutcome {
        self.enqueue_serialized(
            "incident_update",
            RecordUpdate {
                incident_id: Some(incident_id),
                resource_id: None,
                volunteer_id: None,
                action,
                data,
            },
        )
    }

    /// Queue an `alert` summary event.
    pub fn broadcast_alert(&self, alert: &Alert) -> EnqueueOutcome {
        self.enqueue(Envelope::new(
            "alert",
            serde_json::json!({
                "alert_id": alert.id,
                "event": alert.event,
                "severity": alert.severity,
                "headline": alert.headline,
                "description": alert.description,
            }),
        ))
    }

    /// Queue an `alert_cancelled` event linking the original and its
    /// cancellation.
    pub fn broadcast_alert_cancelled(&self, original: AlertId, cancel: AlertId) -> EnqueueOutcome {
        self.enqueue(Envelope::new(
            "alert_cancelled",
            serde_json::json!({
                "original_alert_id": original,
                "cancel_alert_id": cancel,
            }),
        ))
    }

    /// Queue a `resource_update` event.
    pub fn broadcast_resource_update(
        &self,
        resource_id: ResourceId,
        action: &str,
        data: impl Serialize,
    ) -> EnqueueOutcome {
        self.enqueue_serialized(
            "resource_update",
            RecordUpdate {
                incident_id: None,
                resource_id: Some(resource_id),
                volunteer_id: None,
                action,
                data,
            },
        )
    }

    /// Queue a `volunteer_update` event.
    pub fn broadcast_volunteer_update(
        &self,
        volunteer_id: VolunteerId,
        action: &str,
        data: impl Serialize,
    ) -> EnqueueOutcome {
        self.enqueue_serialized(
            "volunteer_update",
            RecordUpdate {
                incident_id: None,
                resource_id: None,
                volunteer_id: Some(volunteer_id),
                action,
                data,
            },
        )
    }
}

/// `{<record>_id, action, data}` payload shared by the update events.
#[derive(Serialize)]
struct RecordUpdate<'a, T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    incident_id: Option<IncidentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volunteer_id: Option<VolunteerId>,
    action: &'a str,
    data: T,
}

/// Consumer side of the broadcast queue. Exactly one exists per hub.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ObserverRegistry>,
    receiver: mpsc::Receiver<Envelope>,
}

impl Dispatcher {
    /// Drain the queue until every [`BroadcastHub`] clone is dropped.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Deliver events until `shutdown` resolves or every [`BroadcastHub`]
    /// clone is dropped.
    ///
    /// On shutdown the queue is closed to producers and the events already
    /// accepted are still delivered, even while hub clones remain alive.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Broadcast dispatcher started");
        let mut shutdown = pin!(shutdown);
        loop {
            let next = tokio::select! {
                biased;
                () = &mut shutdown => break,
                next = self.receiver.recv() => next,
            };
            let Some(event) = next else {
                info!("Broadcast dispatcher stopped");
                return;
            };
            self.dispatch(&event).await;
        }

        self.receiver.close();
        let mut drained: usize = 0;
        while self.run_once().await.is_some() {
            drained = drained.saturating_add(1);
        }
        info!(drained, "Broadcast dispatcher stopped");
    }

    /// Wait for the next event and deliver it. Returns `None` once the
    /// queue is closed and empty.
    pub async fn run_once(&mut self) -> Option<DispatchReport> {
        let event = self.receiver.recv().await?;
        Some(self.dispatch(&event).await)
    }

    /// Deliver `event` to every observer registered right now.
    pub async fn dispatch(&self, event: &Envelope) -> DispatchReport {
        let observers = self.registry.snapshot().await;
        let writes = observers.iter().map(|(handle, observer)| async move {
            (*handle, observer.write_message(event).await)
        });
        let results = join_all(writes).await;

        let mut report = DispatchReport::default();
        for (handle, result) in results {
            match result {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(e) => {
                    warn!(connection = %handle, event_type = %event.kind, error = %e, "observer write failed, evicting");
                    if let Some(observer) = self.registry.unregister(handle).await {
                        observer.close().await;
                    }
                    report.evicted = report.evicted.saturating_add(1);
                }
            }
        }
        debug!(
            event_type = %event.kind,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast dispatched"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connection::{ChannelObserver, Observer};

    fn event(n: usize) -> Envelope {
        Envelope::new("test", serde_json::json!({ "n": n }))
    }

    #[tokio::test]
    async fn saturated_queue_keeps_capacity_and_drops_the_rest() {
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, _dispatcher) = BroadcastHub::new(registry, DEFAULT_QUEUE_CAPACITY);

        let outcomes: Vec<EnqueueOutcome> = (0..300).map(|n| hub.enqueue(event(n))).collect();

        let queued = outcomes
            .iter()
            .filter(|o| **o == EnqueueOutcome::Queued)
            .count();
        assert_eq!(queued, 256);
        assert_eq!(hub.queued_len(), 256);
        assert_eq!(hub.dropped_count(), 44);
        assert!(
            outcomes
                .iter()
                .skip(256)
                .all(|o| *o == EnqueueOutcome::Dropped)
        );
    }

    #[tokio::test]
    async fn events_are_delivered_in_enqueue_order() {
        let registry = Arc::new(ObserverRegistry::new());
        let (channel, mut rx) = ChannelObserver::new(8);
        registry.register(Arc::new(Observer::from(channel))).await;
        let (hub, mut dispatcher) = BroadcastHub::new(Arc::clone(&registry), 8);

        for n in 0..3 {
            assert_eq!(hub.enqueue(event(n)), EnqueueOutcome::Queued);
        }
        for _ in 0..3 {
            dispatcher.run_once().await.unwrap();
        }

        for n in 0..3 {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.data["n"], n);
        }
        assert_eq!(hub.queued_len(), 0);
    }

    #[tokio::test]
    async fn failing_observer_is_evicted_and_others_keep_receiving() {
        let registry = Arc::new(ObserverRegistry::new());
        let (healthy, mut healthy_rx) = ChannelObserver::new(8);
        let (broken, broken_rx) = ChannelObserver::new(8);
        drop(broken_rx);

        let healthy_handle = registry.register(Arc::new(Observer::from(healthy))).await;
        let broken_handle = registry.register(Arc::new(Observer::from(broken))).await;
        let (hub, mut dispatcher) = BroadcastHub::new(Arc::clone(&registry), 8);

        hub.enqueue(event(1));
        let report = dispatcher.run_once().await.unwrap();

        assert_eq!(report, DispatchReport { delivered: 1, evicted: 1 });
        assert!(registry.contains(healthy_handle).await);
        assert!(!registry.contains(broken_handle).await);
        assert_eq!(healthy_rx.recv().await.map(|m| m.kind), Some("test".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_observer_is_evicted_after_write_timeout() {
        let registry = Arc::new(ObserverRegistry::new());
        let (healthy, mut healthy_rx) = ChannelObserver::new(8);
        let (stalled, mut stalled_rx) =
            ChannelObserver::with_write_timeout(1, Duration::from_secs(10));
        let stalled = Arc::new(Observer::from(stalled));
        // Fill the only slot; the receiver is never read while dispatching.
        stalled.write_message(&event(0)).await.unwrap();

        let healthy_handle = registry.register(Arc::new(Observer::from(healthy))).await;
        let stalled_handle = registry.register(Arc::clone(&stalled)).await;
        let (_hub, dispatcher) = BroadcastHub::new(Arc::clone(&registry), 4);

        let report = dispatcher.dispatch(&event(1)).await;

        assert_eq!(report, DispatchReport { delivered: 1, evicted: 1 });
        assert!(registry.contains(healthy_handle).await);
        assert!(!registry.contains(stalled_handle).await);
        assert_eq!(healthy_rx.recv().await.unwrap().data["n"], 1);
        assert_eq!(stalled_rx.recv().await.unwrap().data["n"], 0);
        assert!(stalled_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_drains_queue_while_producers_remain() {
        let registry = Arc::new(ObserverRegistry::new());
        let (channel, mut rx) = ChannelObserver::new(8);
        registry.register(Arc::new(Observer::from(channel))).await;
        let (hub, dispatcher) = BroadcastHub::new(Arc::clone(&registry), 8);
        let producer = hub.clone();
        drop(hub);

        for n in 0..3 {
            assert_eq!(producer.enqueue(event(n)), EnqueueOutcome::Queued);
        }
        let stopped =
            tokio::time::timeout(Duration::from_secs(1), dispatcher.run_until(async {})).await;
        assert!(stopped.is_ok());

        for n in 0..3 {
            assert_eq!(rx.recv().await.unwrap().data["n"], n);
        }
        assert_eq!(producer.enqueue(event(3)), EnqueueOutcome::Dropped);
    }

    #[tokio::test]
    async fn dispatch_with_no_observers_is_a_no_op() {
        let registry = Arc::new(ObserverRegistry::new());
        let (_hub, dispatcher) = BroadcastHub::new(registry, 4);
        let report = dispatcher.dispatch(&event(0)).await;
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn dispatcher_stops_when_all_producers_are_dropped() {
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, dispatcher) = BroadcastHub::new(registry, 4);
        hub.enqueue(event(0));
        drop(hub);
        dispatcher.run().await;
    }

    #[test]
    fn enqueue_after_dispatcher_is_gone_drops() {
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, dispatcher) = BroadcastHub::new(registry, 4);
        drop(dispatcher);
        assert_eq!(hub.enqueue(event(0)), EnqueueOutcome::Dropped);
        assert_eq!(hub.dropped_count(), 1);
    }

    #[test]
    fn incident_update_payload_carries_id_action_and_data() {
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, mut dispatcher) = BroadcastHub::new(registry, 4);
        let id = IncidentId::new();
        hub.broadcast_incident_update(id, "created", serde_json::json!({ "title": "Flood" }));

        let queued = dispatcher.receiver.try_recv().unwrap();
        assert_eq!(queued.kind, "incident_update");
        assert_eq!(queued.data["incident_id"], id.to_string());
        assert_eq!(queued.data["action"], "created");
        assert_eq!(queued.data["data"]["title"], "Flood");
        assert!(queued.data.get("resource_id").is_none());
    }

    #[test]
    fn alert_cancelled_payload_references_both_alerts() {
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, mut dispatcher) = BroadcastHub::new(registry, 4);
        let original = AlertId::new();
        let cancel = AlertId::new();
        hub.broadcast_alert_cancelled(original, cancel);

        let queued = dispatcher.receiver.try_recv().unwrap();
        assert_eq!(queued.kind, "alert_cancelled");
        assert_eq!(queued.data["original_alert_id"], original.to_string());
        assert_eq!(queued.data["cancel_alert_id"], cancel.to_string());
    }
}
