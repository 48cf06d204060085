//! The persistent store seen by the rest of the service.
//!
//! [`Store`] dispatches to `PostgreSQL` or to the in-memory backend. Both
//! backends expose the same inherent methods; this enum only forwards.

use crisis_types::{
    Alert, AlertId, Incident, IncidentId, IncidentUpdate, Resource, ResourceId, Volunteer,
    VolunteerId,
};

use crate::error::DbError;
use crate::memory::MemoryStore;
use crate::pg_store::PgStore;
use crate::query::{
    AlertFilter, IncidentFilter, Listing, MapBounds, Page, ResourceFilter, VolunteerFilter,
};

/// Forward a call to whichever backend is active.
macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Self::Postgres($backend) => $call,
            Self::Memory($backend) => $call,
        }
    };
}

/// Persistent record store.
#[derive(Clone)]
pub enum Store {
    /// Durable `PostgreSQL` storage.
    Postgres(PgStore),
    /// Process-local storage.
    Memory(MemoryStore),
}

impl Store {
    /// Short backend name for logs and health output.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    /// Insert a new incident.
    pub async fn insert_incident(&self, incident: &Incident) -> Result<(), DbError> {
        dispatch!(self, s => s.insert_incident(incident).await)
    }

    /// Replace an existing incident.
    pub async fn update_incident(&self, incident: &Incident) -> Result<(), DbError> {
        dispatch!(self, s => s.update_incident(incident).await)
    }

    /// Fetch one incident.
    pub async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, DbError> {
        dispatch!(self, s => s.get_incident(id).await)
    }

    /// List incidents, newest first.
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: Page,
    ) -> Result<Listing<Incident>, DbError> {
        dispatch!(self, s => s.list_incidents(filter, page).await)
    }

    /// Unresolved incidents for the map view.
    pub async fn map_incidents(&self, bounds: Option<MapBounds>) -> Result<Vec<Incident>, DbError> {
        dispatch!(self, s => s.map_incidents(bounds).await)
    }

    /// Append a progress note.
    pub async fn insert_update(&self, update: &IncidentUpdate) -> Result<(), DbError> {
        dispatch!(self, s => s.insert_update(update).await)
    }

    /// Notes attached to an incident, newest first.
    pub async fn list_updates(&self, incident: IncidentId) -> Result<Vec<IncidentUpdate>, DbError> {
        dispatch!(self, s => s.list_updates(incident).await)
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert an alert; duplicate CAP identifiers fail with
    /// [`DbError::Duplicate`].
    pub async fn insert_alert(&self, alert: &Alert) -> Result<(), DbError> {
        dispatch!(self, s => s.insert_alert(alert).await)
    }

    /// Replace an existing alert.
    pub async fn update_alert(&self, alert: &Alert) -> Result<(), DbError> {
        dispatch!(self, s => s.update_alert(alert).await)
    }

    /// Fetch one alert by storage id.
    pub async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, DbError> {
        dispatch!(self, s => s.get_alert(id).await)
    }

    /// Fetch one alert by CAP identifier.
    pub async fn find_alert_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Alert>, DbError> {
        dispatch!(self, s => s.find_alert_by_identifier(identifier).await)
    }

    /// List alerts, most recently sent first.
    pub async fn list_alerts(
        &self,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Listing<Alert>, DbError> {
        dispatch!(self, s => s.list_alerts(filter, page).await)
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Insert a new resource.
    pub async fn insert_resource(&self, resource: &Resource) -> Result<(), DbError> {
        dispatch!(self, s => s.insert_resource(resource).await)
    }

    /// Replace an existing resource.
    pub async fn update_resource(&self, resource: &Resource) -> Result<(), DbError> {
        dispatch!(self, s => s.update_resource(resource).await)
    }

    /// Fetch one resource.
    pub async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>, DbError> {
        dispatch!(self, s => s.get_resource(id).await)
    }

    /// List resources, newest first.
    pub async fn list_resources(
        &self,
        filter: &ResourceFilter,
        page: Page,
    ) -> Result<Listing<Resource>, DbError> {
        dispatch!(self, s => s.list_resources(filter, page).await)
    }

    /// Resources deployed to an incident.
    pub async fn resources_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<Resource>, DbError> {
        dispatch!(self, s => s.resources_for_incident(incident).await)
    }

    // =========================================================================
    // Volunteers
    // =========================================================================

    /// Insert a new volunteer.
    pub async fn insert_volunteer(&self, volunteer: &Volunteer) -> Result<(), DbError> {
        dispatch!(self, s => s.insert_volunteer(volunteer).await)
    }

    /// Replace an existing volunteer.
    pub async fn update_volunteer(&self, volunteer: &Volunteer) -> Result<(), DbError> {
        dispatch!(self, s => s.update_volunteer(volunteer).await)
    }

    /// Fetch one volunteer.
    pub async fn get_volunteer(&self, id: VolunteerId) -> Result<Option<Volunteer>, DbError> {
        dispatch!(self, s => s.get_volunteer(id).await)
    }

    /// List volunteers, newest first.
    pub async fn list_volunteers(
        &self,
        filter: &VolunteerFilter,
        page: Page,
    ) -> Result<Listing<Volunteer>, DbError> {
        dispatch!(self, s => s.list_volunteers(filter, page).await)
    }

    /// Volunteers deployed to an incident.
    pub async fn volunteers_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<Volunteer>, DbError> {
        dispatch!(self, s => s.volunteers_for_incident(incident).await)
    }

    /// Available volunteers in registration order (the matching pool).
    pub async fn available_volunteers(&self, medical_only: bool) -> Result<Vec<Volunteer>, DbError> {
        dispatch!(self, s => s.available_volunteers(medical_only).await)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

impl From<MemoryStore> for Store {
    fn from(store: MemoryStore) -> Self {
        Self::Memory(store)
    }
}

impl From<PgStore> for Store {
    fn from(store: PgStore) -> Self {
        Self::Postgres(store)
    }
}
