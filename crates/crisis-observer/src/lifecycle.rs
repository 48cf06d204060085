//! Alert lifecycle: issue, broadcast, cancel.
//!
//! ```text
//! Draft --issue--> Issued --broadcast--> Broadcasted
//!                    |                        |
//!                    +--------cancel----------+--> Cancelled
//! ```
//!
//! Issuing persists the record and hands the broadcast to a background
//! task, so the caller gets its response as soon as the record is stored.
//! Broadcasting favours timeliness: observers are notified even if the
//! store rejects the broadcast-status update. Cancelling never touches the
//! original record; it stores a separate CAP `Cancel` message whose
//! identifier is the original's plus `-CANCEL`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use crisis_db::Store;
use crisis_events::{EventBus, topics};
use crisis_types::{
    Alert, AlertId, AlertStatus, CANCELLED_HEADLINE_PREFIX, Category, Certainty, IncidentId,
    LifecycleState, MessageType, Scope, Severity, Urgency,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AlertError;
use crate::hub::BroadcastHub;
use crate::registry::ObserverRegistry;

/// Description carried by every cancellation record.
pub const CANCELLED_DESCRIPTION: &str = "This alert has been cancelled";

/// Body of an alert-issue request. Only `sender`, `event` and
/// `description` are required; everything else falls back to the CAP
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertRequest {
    /// Originator.
    pub sender: String,
    /// Handling code.
    pub status: AlertStatus,
    /// Nature of the message.
    pub msg_type: MessageType,
    /// Intended distribution.
    pub scope: Scope,
    /// Subject event text.
    pub event: String,
    /// Subject event category.
    pub category: Category,
    /// Time available to prepare.
    pub urgency: Urgency,
    /// Intensity of impact.
    pub severity: Severity,
    /// Confidence in the observation.
    pub certainty: Certainty,
    /// Headline.
    pub headline: String,
    /// Hazard description.
    pub description: String,
    /// Recommended action.
    pub instruction: String,
    /// Effective time.
    pub effective: Option<DateTime<Utc>>,
    /// Expected onset.
    pub onset: Option<DateTime<Utc>>,
    /// Expiry.
    pub expires: Option<DateTime<Utc>>,
    /// Affected area.
    pub area_desc: String,
    /// Affected polygons.
    pub polygons: Vec<String>,
    /// Affected circles.
    pub circles: Vec<String>,
    /// Related incident. Values that are not UUIDs are ignored.
    pub incident_id: Option<String>,
}

impl AlertRequest {
    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("sender", &self.sender),
            ("event", &self.event),
            ("description", &self.description),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Drives alert records through their lifecycle.
#[derive(Debug, Clone)]
pub struct AlertLifecycle {
    store: Store,
    bus: EventBus,
    hub: BroadcastHub,
    registry: Arc<ObserverRegistry>,
    broadcast_enabled: bool,
    sequence: Arc<AtomicU64>,
}

impl AlertLifecycle {
    /// Build a lifecycle over the given collaborators. With
    /// `broadcast_enabled` off, issued alerts stay `Issued`.
    pub fn new(
        store: Store,
        bus: EventBus,
        hub: BroadcastHub,
        registry: Arc<ObserverRegistry>,
        broadcast_enabled: bool,
    ) -> Self {
        Self {
            store,
            bus,
            hub,
            registry,
            broadcast_enabled,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// CAP identifier for an alert from `sender` issued at `sent`.
    ///
    /// `nexus-crisis-{sender}-{unix seconds}-{sequence}`; the per-process
    /// sequence keeps identifiers distinct within one second.
    fn identifier(&self, sender: &str, sent: DateTime<Utc>) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("nexus-crisis-{sender}-{}-{sequence}", sent.timestamp())
    }

    /// Validate a request and build the record it describes.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Validation`] listing every empty required
    /// field.
    pub fn draft(&self, request: AlertRequest) -> Result<Alert, AlertError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(AlertError::Validation { missing });
        }

        let now = Utc::now();
        let incident_id = request
            .incident_id
            .as_deref()
            .and_then(|raw| raw.parse::<IncidentId>().ok());

        Ok(Alert {
            id: AlertId::new(),
            identifier: self.identifier(&request.sender, now),
            sender: request.sender,
            sent: now,
            status: request.status,
            msg_type: request.msg_type,
            scope: request.scope,
            event: request.event,
            category: request.category,
            urgency: request.urgency,
            severity: request.severity,
            certainty: request.certainty,
            headline: request.headline,
            description: request.description,
            instruction: request.instruction,
            effective: request.effective,
            onset: request.onset,
            expires: request.expires,
            area_desc: request.area_desc,
            polygons: request.polygons,
            circles: request.circles,
            incident_id,
            broadcasted: false,
            broadcasted_at: None,
            recipients: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate, persist as `Issued`, and schedule the broadcast.
    ///
    /// Returns the stored record as issued; the broadcast runs on a
    /// spawned task and its outcome never reaches the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Validation`] for missing fields and
    /// [`AlertError::Store`] if the record cannot be stored.
    pub async fn issue(&self, request: AlertRequest) -> Result<Alert, AlertError> {
        let alert = self.draft(request)?;
        self.store.insert_alert(&alert).await?;
        info!(
            alert_id = %alert.id,
            identifier = %alert.identifier,
            severity = alert.severity.as_str(),
            "Alert issued"
        );

        if self.broadcast_enabled {
            let lifecycle = self.clone();
            let issued = alert.clone();
            tokio::spawn(async move {
                lifecycle.broadcast(issued).await;
            });
        } else {
            debug!(alert_id = %alert.id, "alert broadcasting disabled");
        }

        Ok(alert)
    }

    /// Mark `alert` broadcasted, persist that, publish `alert.broadcasted`,
    /// and queue the `alert` summary for observers.
    ///
    /// A failed store update is logged and does not stop the broadcast.
    /// Returns the record as broadcast.
    pub async fn broadcast(&self, mut alert: Alert) -> Alert {
        let now = Utc::now();
        alert.broadcasted = true;
        alert.broadcasted_at = Some(now);
        alert.recipients = u32::try_from(self.registry.count().await).unwrap_or(u32::MAX);
        alert.updated_at = now;

        if let Err(e) = self.store.update_alert(&alert).await {
            warn!(alert_id = %alert.id, error = %e, "failed to persist broadcast status");
        }

        self.bus.publish(
            topics::ALERT_BROADCASTED,
            &alert.id.to_string(),
            serde_json::json!({
                "alert_id": alert.id,
                "identifier": alert.identifier,
                "event": alert.event,
                "severity": alert.severity,
                "urgency": alert.urgency,
                "headline": alert.headline,
                "description": alert.description,
                "area_desc": alert.area_desc,
                "timestamp": alert.sent,
            }),
        );
        let outcome = self.hub.broadcast_alert(&alert);
        info!(
            alert_id = %alert.id,
            recipients = alert.recipients,
            ?outcome,
            "Alert broadcasted"
        );
        alert
    }

    /// Supersede an alert with a CAP `Cancel` message.
    ///
    /// The original record is left exactly as it was. The cancellation is
    /// stored, published as `alert.cancelled`, and queued for observers as
    /// `alert_cancelled`.
    ///
    /// # Errors
    ///
    /// - [`AlertError::NotFound`] if `original_id` does not exist; nothing
    ///   is stored.
    /// - [`AlertError::Conflict`] if the target is itself a cancellation or
    ///   has already been cancelled.
    /// - [`AlertError::Store`] if the store fails.
    pub async fn cancel(&self, original_id: AlertId) -> Result<Alert, AlertError> {
        let original = self
            .store
            .get_alert(original_id)
            .await?
            .ok_or(AlertError::NotFound(original_id))?;

        if original.is_cancellation() {
            return Err(AlertError::Conflict(format!(
                "alert {} is a cancellation and cannot be cancelled",
                original.identifier
            )));
        }
        let cancel_identifier = original.cancel_identifier();
        if self
            .store
            .find_alert_by_identifier(&cancel_identifier)
            .await?
            .is_some()
        {
            return Err(AlertError::Conflict(format!(
                "alert {} is already cancelled",
                original.identifier
            )));
        }

        let recipients = u32::try_from(self.registry.count().await).unwrap_or(u32::MAX);
        let cancel = cancellation_of(&original, Utc::now(), recipients);
        self.store.insert_alert(&cancel).await?;

        self.bus.publish(
            topics::ALERT_CANCELLED,
            &original.id.to_string(),
            serde_json::json!({
                "original_alert_id": original.id,
                "cancel_alert_id": cancel.id,
                "identifier": cancel.identifier,
                "timestamp": cancel.sent,
            }),
        );
        self.hub.broadcast_alert_cancelled(original.id, cancel.id);
        info!(
            alert_id = %original.id,
            cancel_id = %cancel.id,
            identifier = %cancel.identifier,
            "Alert cancelled"
        );
        Ok(cancel)
    }

    /// Current lifecycle state of a stored alert.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Store`] if the cancellation lookup fails.
    pub async fn state(&self, alert: &Alert) -> Result<LifecycleState, AlertError> {
        if !alert.is_cancellation()
            && self
                .store
                .find_alert_by_identifier(&alert.cancel_identifier())
                .await?
                .is_some()
        {
            return Ok(LifecycleState::Cancelled);
        }
        Ok(if alert.broadcasted {
            LifecycleState::Broadcasted
        } else {
            LifecycleState::Issued
        })
    }
}

/// The CAP `Cancel` record superseding `original`.
///
/// It is delivered through the hub as soon as it is stored, so it is
/// recorded as broadcast at creation.
pub fn cancellation_of(original: &Alert, now: DateTime<Utc>, recipients: u32) -> Alert {
    Alert {
        id: AlertId::new(),
        identifier: original.cancel_identifier(),
        sender: original.sender.clone(),
        sent: now,
        status: AlertStatus::Actual,
        msg_type: MessageType::Cancel,
        scope: original.scope,
        event: original.event.clone(),
        category: original.category,
        urgency: Urgency::Past,
        severity: Severity::Low,
        certainty: Certainty::Observed,
        headline: format!("{CANCELLED_HEADLINE_PREFIX}{}", original.headline),
        description: CANCELLED_DESCRIPTION.to_owned(),
        instruction: String::new(),
        effective: None,
        onset: None,
        expires: None,
        area_desc: original.area_desc.clone(),
        polygons: Vec::new(),
        circles: Vec::new(),
        incident_id: original.incident_id,
        broadcasted: true,
        broadcasted_at: Some(now),
        recipients,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crisis_db::MemoryStore;
    use crisis_events::RecordingBus;

    use super::*;
    use crate::hub::Dispatcher;

    struct Fixture {
        lifecycle: AlertLifecycle,
        memory: MemoryStore,
        recorder: RecordingBus,
        dispatcher: Dispatcher,
    }

    fn fixture(broadcast_enabled: bool) -> Fixture {
        let memory = MemoryStore::new();
        let recorder = RecordingBus::new();
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, dispatcher) = BroadcastHub::new(Arc::clone(&registry), 16);
        let lifecycle = AlertLifecycle::new(
            Store::from(memory.clone()),
            EventBus::Recording(recorder.clone()),
            hub,
            registry,
            broadcast_enabled,
        );
        Fixture {
            lifecycle,
            memory,
            recorder,
            dispatcher,
        }
    }

    fn flood_warning() -> AlertRequest {
        AlertRequest {
            sender: "NWS".to_owned(),
            event: "Flood Warning".to_owned(),
            description: "Heavy rainfall".to_owned(),
            headline: "River flooding expected".to_owned(),
            severity: Severity::High,
            category: Category::Met,
            ..AlertRequest::default()
        }
    }

    #[test]
    fn missing_fields_are_listed_in_order() {
        let request = AlertRequest {
            event: "Flood Warning".to_owned(),
            description: "   ".to_owned(),
            ..AlertRequest::default()
        };
        assert_eq!(request.missing_fields(), vec!["sender", "description"]);
    }

    #[tokio::test]
    async fn issue_rejects_missing_fields_and_stores_nothing() {
        let f = fixture(true);
        let result = f.lifecycle.issue(AlertRequest::default()).await;
        assert!(matches!(
            result,
            Err(AlertError::Validation { ref missing }) if missing.len() == 3
        ));
        let store = Store::from(f.memory);
        let listing = store
            .list_alerts(&crisis_db::AlertFilter::default(), crisis_db::Page::default())
            .await
            .unwrap();
        assert_eq!(listing.total, 0);
    }

    #[tokio::test]
    async fn identifiers_are_unique_within_one_second() {
        let f = fixture(false);
        let a = f.lifecycle.issue(flood_warning()).await.unwrap();
        let b = f.lifecycle.issue(flood_warning()).await.unwrap();
        assert_ne!(a.identifier, b.identifier);
        assert!(a.identifier.starts_with("nexus-crisis-NWS-"));
    }

    #[tokio::test]
    async fn issue_without_broadcast_stays_issued() {
        let f = fixture(false);
        let alert = f.lifecycle.issue(flood_warning()).await.unwrap();
        tokio::task::yield_now().await;

        let stored = Store::from(f.memory.clone())
            .get_alert(alert.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.broadcasted);
        assert_eq!(
            f.lifecycle.state(&stored).await.unwrap(),
            LifecycleState::Issued
        );
        assert!(f.recorder.on_topic(topics::ALERT_BROADCASTED).is_empty());
    }

    #[tokio::test]
    async fn broadcast_marks_record_and_notifies() {
        let mut f = fixture(false);
        let alert = f.lifecycle.issue(flood_warning()).await.unwrap();

        let broadcast = f.lifecycle.broadcast(alert.clone()).await;
        assert!(broadcast.broadcasted);
        assert!(broadcast.broadcasted_at.is_some());

        let stored = Store::from(f.memory.clone())
            .get_alert(alert.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.broadcasted);

        let published = f.recorder.on_topic(topics::ALERT_BROADCASTED);
        assert_eq!(published.len(), 1);
        assert_eq!(
            published.first().map(|e| e.data["identifier"].clone()),
            Some(serde_json::json!(alert.identifier))
        );

        let report = f.dispatcher.run_once().await.unwrap();
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn broadcast_survives_store_failure() {
        let f = fixture(false);
        let alert = f.lifecycle.issue(flood_warning()).await.unwrap();

        f.memory.set_fail_writes(true);
        let broadcast = f.lifecycle.broadcast(alert.clone()).await;
        assert!(broadcast.broadcasted);
        assert_eq!(f.recorder.on_topic(topics::ALERT_BROADCASTED).len(), 1);

        f.memory.set_fail_writes(false);
        let stored = Store::from(f.memory.clone())
            .get_alert(alert.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.broadcasted);
    }

    #[tokio::test]
    async fn cancel_missing_alert_is_not_found_and_stores_nothing() {
        let f = fixture(false);
        let missing = AlertId::new();
        let result = f.lifecycle.cancel(missing).await;
        assert!(matches!(result, Err(AlertError::NotFound(id)) if id == missing));

        let listing = Store::from(f.memory)
            .list_alerts(&crisis_db::AlertFilter::default(), crisis_db::Page::default())
            .await
            .unwrap();
        assert_eq!(listing.total, 0);
    }

    #[tokio::test]
    async fn cancel_leaves_original_untouched() {
        let f = fixture(false);
        let original = f.lifecycle.issue(flood_warning()).await.unwrap();
        let store = Store::from(f.memory.clone());
        let before = store.get_alert(original.id).await.unwrap().unwrap();

        let cancel = f.lifecycle.cancel(original.id).await.unwrap();

        let after = store.get_alert(original.id).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(cancel.identifier, format!("{}-CANCEL", original.identifier));
        assert_eq!(cancel.msg_type, MessageType::Cancel);
        assert_eq!(cancel.urgency, Urgency::Past);
        assert_eq!(cancel.severity, Severity::Low);
        assert_eq!(cancel.certainty, Certainty::Observed);
        assert_eq!(cancel.headline, "CANCELLED: River flooding expected");
        assert_eq!(cancel.sender, original.sender);
        assert_eq!(cancel.scope, original.scope);
        assert_eq!(cancel.event, original.event);
        assert_eq!(cancel.category, original.category);

        assert_eq!(
            f.lifecycle.state(&after).await.unwrap(),
            LifecycleState::Cancelled
        );
        assert_eq!(f.recorder.on_topic(topics::ALERT_CANCELLED).len(), 1);
    }

    #[tokio::test]
    async fn second_cancel_conflicts() {
        let f = fixture(false);
        let original = f.lifecycle.issue(flood_warning()).await.unwrap();
        let cancel = f.lifecycle.cancel(original.id).await.unwrap();

        assert!(matches!(
            f.lifecycle.cancel(original.id).await,
            Err(AlertError::Conflict(_))
        ));
        assert!(matches!(
            f.lifecycle.cancel(cancel.id).await,
            Err(AlertError::Conflict(_))
        ));
    }

    #[test]
    fn unparseable_incident_link_is_ignored() {
        let f = fixture(false);
        let request = AlertRequest {
            incident_id: Some("not-a-uuid".to_owned()),
            ..flood_warning()
        };
        let alert = f.lifecycle.draft(request).unwrap();
        assert!(alert.incident_id.is_none());
        assert!(!alert.broadcasted);
    }
}
