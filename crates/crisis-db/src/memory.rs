//! In-process record store.
//!
//! Used when no `PostgreSQL` URL is configured and by tests. Tables are
//! ordered maps keyed by UUID v7 ids, so iteration order is creation order.
//! Writes can be switched off with [`MemoryStore::set_fail_writes`] to
//! exercise storage-outage paths.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crisis_types::{
    Alert, AlertId, Incident, IncidentId, IncidentStatus, IncidentUpdate, Resource, ResourceId,
    UpdateId, Volunteer, VolunteerId,
};
use tokio::sync::RwLock;

use crate::error::DbError;
use crate::query::{
    AlertFilter, IncidentFilter, Listing, MapBounds, Page, ResourceFilter, VolunteerFilter,
};

#[derive(Default)]
struct Tables {
    incidents: BTreeMap<IncidentId, Incident>,
    updates: BTreeMap<UpdateId, IncidentUpdate>,
    alerts: BTreeMap<AlertId, Alert>,
    resources: BTreeMap<ResourceId, Resource>,
    volunteers: BTreeMap<VolunteerId, Volunteer>,
}

/// Record store held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`DbError::Unavailable`]
    /// (or succeed again when `fail` is false).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store is refusing writes".to_owned()));
        }
        Ok(())
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    /// Insert a new incident.
    pub async fn insert_incident(&self, incident: &Incident) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        tables.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    /// Replace an existing incident.
    pub async fn update_incident(&self, incident: &Incident) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let slot = tables
            .incidents
            .get_mut(&incident.id)
            .ok_or_else(|| DbError::NotFound(format!("incident {}", incident.id)))?;
        *slot = incident.clone();
        Ok(())
    }

    /// Fetch one incident.
    pub async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, DbError> {
        Ok(self.tables.read().await.incidents.get(&id).cloned())
    }

    /// List incidents, newest first.
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: Page,
    ) -> Result<Listing<Incident>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables.incidents.values().rev().filter(|i| {
            filter.status.is_none_or(|s| i.status == s)
                && filter.incident_type.is_none_or(|t| i.incident_type == t)
                && filter.severity.is_none_or(|s| i.severity == s)
                && filter.verified.is_none_or(|v| i.verified == v)
        });
        Ok(paged(newest_first(matching, |i| i.created_at), page))
    }

    /// Unresolved incidents, optionally restricted to a bounding box.
    pub async fn map_incidents(&self, bounds: Option<MapBounds>) -> Result<Vec<Incident>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables.incidents.values().rev().filter(|i| {
            i.status != IncidentStatus::Resolved
                && bounds.is_none_or(|b| b.contains(i.latitude, i.longitude))
        });
        Ok(newest_first(matching, |i| i.created_at))
    }

    // =========================================================================
    // Incident updates
    // =========================================================================

    /// Append a progress note.
    pub async fn insert_update(&self, update: &IncidentUpdate) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        tables.updates.insert(update.id, update.clone());
        Ok(())
    }

    /// Notes attached to an incident, newest first.
    pub async fn list_updates(&self, incident: IncidentId) -> Result<Vec<IncidentUpdate>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables
            .updates
            .values()
            .rev()
            .filter(|u| u.incident_id == incident);
        Ok(newest_first(matching, |u| u.created_at))
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert an alert. Fails with [`DbError::Duplicate`] if the CAP
    /// identifier is already taken.
    pub async fn insert_alert(&self, alert: &Alert) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if tables
            .alerts
            .values()
            .any(|a| a.identifier == alert.identifier)
        {
            return Err(DbError::Duplicate(alert.identifier.clone()));
        }
        tables.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    /// Replace an existing alert.
    pub async fn update_alert(&self, alert: &Alert) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let slot = tables
            .alerts
            .get_mut(&alert.id)
            .ok_or_else(|| DbError::NotFound(format!("alert {}", alert.id)))?;
        *slot = alert.clone();
        Ok(())
    }

    /// Fetch one alert by storage id.
    pub async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, DbError> {
        Ok(self.tables.read().await.alerts.get(&id).cloned())
    }

    /// Fetch one alert by CAP identifier.
    pub async fn find_alert_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Alert>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .values()
            .find(|a| a.identifier == identifier)
            .cloned())
    }

    /// List alerts, most recently sent first.
    pub async fn list_alerts(
        &self,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Listing<Alert>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables.alerts.values().rev().filter(|a| {
            filter.active_at.is_none_or(|now| a.is_active_at(now))
                && filter.severity.is_none_or(|s| a.severity == s)
                && filter.category.is_none_or(|c| a.category == c)
        });
        Ok(paged(newest_first(matching, |a| a.sent), page))
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Insert a new resource.
    pub async fn insert_resource(&self, resource: &Resource) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        tables.resources.insert(resource.id, resource.clone());
        Ok(())
    }

    /// Replace an existing resource.
    pub async fn update_resource(&self, resource: &Resource) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let slot = tables
            .resources
            .get_mut(&resource.id)
            .ok_or_else(|| DbError::NotFound(format!("resource {}", resource.id)))?;
        *slot = resource.clone();
        Ok(())
    }

    /// Fetch one resource.
    pub async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>, DbError> {
        Ok(self.tables.read().await.resources.get(&id).cloned())
    }

    /// List resources, newest first.
    pub async fn list_resources(
        &self,
        filter: &ResourceFilter,
        page: Page,
    ) -> Result<Listing<Resource>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables.resources.values().rev().filter(|r| {
            filter
                .resource_type
                .as_ref()
                .is_none_or(|t| &r.resource_type == t)
                && filter.available.is_none_or(|a| r.available == a)
        });
        Ok(paged(newest_first(matching, |r| r.created_at), page))
    }

    /// Resources deployed to an incident.
    pub async fn resources_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<Resource>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables
            .resources
            .values()
            .rev()
            .filter(|r| r.deployed_to == Some(incident));
        Ok(newest_first(matching, |r| r.created_at))
    }

    // =========================================================================
    // Volunteers
    // =========================================================================

    /// Insert a new volunteer.
    pub async fn insert_volunteer(&self, volunteer: &Volunteer) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        tables.volunteers.insert(volunteer.id, volunteer.clone());
        Ok(())
    }

    /// Replace an existing volunteer.
    pub async fn update_volunteer(&self, volunteer: &Volunteer) -> Result<(), DbError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let slot = tables
            .volunteers
            .get_mut(&volunteer.id)
            .ok_or_else(|| DbError::NotFound(format!("volunteer {}", volunteer.id)))?;
        *slot = volunteer.clone();
        Ok(())
    }

    /// Fetch one volunteer.
    pub async fn get_volunteer(&self, id: VolunteerId) -> Result<Option<Volunteer>, DbError> {
        Ok(self.tables.read().await.volunteers.get(&id).cloned())
    }

    /// List volunteers, newest first.
    pub async fn list_volunteers(
        &self,
        filter: &VolunteerFilter,
        page: Page,
    ) -> Result<Listing<Volunteer>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables.volunteers.values().rev().filter(|v| {
            filter.available.is_none_or(|a| v.available == a)
                && filter
                    .medical_training
                    .is_none_or(|m| v.medical_training == m)
                && filter.country.as_ref().is_none_or(|c| &v.country == c)
        });
        Ok(paged(newest_first(matching, |v| v.created_at), page))
    }

    /// Volunteers deployed to an incident.
    pub async fn volunteers_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<Volunteer>, DbError> {
        let tables = self.tables.read().await;
        let matching = tables
            .volunteers
            .values()
            .rev()
            .filter(|v| v.deployed_to == Some(incident));
        Ok(newest_first(matching, |v| v.created_at))
    }

    /// The matching pool: available volunteers in registration order,
    /// optionally restricted to those with medical training.
    pub async fn available_volunteers(&self, medical_only: bool) -> Result<Vec<Volunteer>, DbError> {
        let tables = self.tables.read().await;
        let mut pool: Vec<Volunteer> = tables
            .volunteers
            .values()
            .filter(|v| v.available && (!medical_only || v.medical_training))
            .cloned()
            .collect();
        pool.sort_by_key(|v| v.created_at);
        Ok(pool)
    }
}

/// Collect records (already in descending id order) and stable-sort them by
/// a timestamp, newest first.
fn newest_first<'a, T, I, K>(records: I, key: K) -> Vec<T>
where
    T: Clone + 'a,
    I: Iterator<Item = &'a T>,
    K: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    let mut out: Vec<T> = records.cloned().collect();
    out.sort_by_key(|record| Reverse(key(record)));
    out
}

fn paged<T>(records: Vec<T>, page: Page) -> Listing<T> {
    let total = u64::try_from(records.len()).unwrap_or(u64::MAX);
    Listing {
        items: page.apply(records),
        total,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::{Duration, Utc};
    use crisis_types::{
        AlertStatus, Category, Certainty, IncidentType, MessageType, Scope, Severity, Urgency,
    };

    use super::*;

    fn incident(title: &str, status: IncidentStatus, lat: f64) -> Incident {
        let now = Utc::now();
        Incident {
            id: IncidentId::new(),
            title: title.to_owned(),
            description: String::new(),
            incident_type: IncidentType::NaturalDisaster,
            status,
            severity: Severity::High,
            latitude: lat,
            longitude: 0.0,
            location_name: String::new(),
            address: String::new(),
            country: String::new(),
            region: String::new(),
            reporter_name: String::new(),
            reporter_contact: String::new(),
            affected_people: 0,
            casualties: 0,
            image_urls: Vec::new(),
            video_urls: Vec::new(),
            verified: false,
            verified_at: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn alert(identifier: &str, expires: Option<chrono::DateTime<Utc>>) -> Alert {
        let now = Utc::now();
        Alert {
            id: AlertId::new(),
            identifier: identifier.to_owned(),
            sender: "NWS".to_owned(),
            sent: now,
            status: AlertStatus::Actual,
            msg_type: MessageType::Alert,
            scope: Scope::Public,
            event: "Flood Warning".to_owned(),
            category: Category::Met,
            urgency: Urgency::Expected,
            severity: Severity::High,
            certainty: Certainty::Likely,
            headline: String::new(),
            description: "Heavy rainfall".to_owned(),
            instruction: String::new(),
            effective: None,
            onset: None,
            expires,
            area_desc: String::new(),
            polygons: Vec::new(),
            circles: Vec::new(),
            incident_id: None,
            broadcasted: false,
            broadcasted_at: None,
            recipients: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn incidents_list_newest_first_with_total() {
        let store = MemoryStore::new();
        let mut older = incident("older", IncidentStatus::Reported, 1.0);
        older.created_at -= Duration::minutes(5);
        let newer = incident("newer", IncidentStatus::Reported, 2.0);
        store.insert_incident(&older).await.unwrap();
        store.insert_incident(&newer).await.unwrap();

        let listing = store
            .list_incidents(&IncidentFilter::default(), Page::new(Some(1), None))
            .await
            .unwrap();
        assert_eq!(listing.total, 2);
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items.first().unwrap().title, "newer");
    }

    #[test]
    fn newest_first_keeps_scan_order_on_ties() {
        let now = Utc::now();
        let rows = [("a", now), ("b", now - Duration::minutes(1)), ("c", now)];
        let sorted = newest_first(rows.iter(), |row| row.1);
        let labels: Vec<&str> = sorted.iter().map(|row| row.0).collect();
        assert_eq!(labels, ["a", "c", "b"]);
    }

    #[tokio::test]
    async fn map_excludes_resolved_and_out_of_bounds() {
        let store = MemoryStore::new();
        store
            .insert_incident(&incident("inside", IncidentStatus::Responding, 5.0))
            .await
            .unwrap();
        store
            .insert_incident(&incident("resolved", IncidentStatus::Resolved, 5.0))
            .await
            .unwrap();
        store
            .insert_incident(&incident("outside", IncidentStatus::Reported, 50.0))
            .await
            .unwrap();

        let bounds = MapBounds {
            min_lat: 0.0,
            max_lat: 10.0,
            min_lon: -1.0,
            max_lon: 1.0,
        };
        let map = store.map_incidents(Some(bounds)).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.first().unwrap().title, "inside");
    }

    #[tokio::test]
    async fn duplicate_alert_identifier_is_rejected() {
        let store = MemoryStore::new();
        store.insert_alert(&alert("a-1", None)).await.unwrap();
        let err = store.insert_alert(&alert("a-1", None)).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn active_filter_hides_expired_alerts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_alert(&alert("expired", Some(now - Duration::hours(1))))
            .await
            .unwrap();
        store
            .insert_alert(&alert("live", Some(now + Duration::hours(1))))
            .await
            .unwrap();
        let filter = AlertFilter {
            active_at: Some(now),
            ..AlertFilter::default()
        };
        let listing = store.list_alerts(&filter, Page::default()).await.unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.items.first().unwrap().identifier, "live");
    }

    #[tokio::test]
    async fn refused_writes_surface_as_unavailable() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.insert_alert(&alert("x", None)).await.unwrap_err();
        assert!(matches!(err, DbError::Unavailable(_)));
        store.set_fail_writes(false);
        assert!(store.insert_alert(&alert("x", None)).await.is_ok());
    }

    #[tokio::test]
    async fn updating_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store.update_alert(&alert("ghost", None)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
