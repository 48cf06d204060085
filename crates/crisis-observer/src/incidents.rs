//! Incident report endpoints.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/crisis/incidents` | Report an incident |
//! | `GET` | `/api/v1/crisis/incidents` | List incidents |
//! | `GET` | `/api/v1/crisis/incidents/{id}` | Incident plus its updates |
//! | `PATCH` | `/api/v1/crisis/incidents/{id}` | Change status, severity or counts |
//! | `POST` | `/api/v1/crisis/incidents/{id}/verify` | Mark verified |
//! | `POST` | `/api/v1/crisis/incidents/{id}/updates` | Add a progress note |
//! | `GET` | `/api/v1/crisis/map` | Unresolved incidents for the map |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use crisis_db::{IncidentFilter, MapBounds, Page, incident_key};
use crisis_events::topics;
use crisis_types::{
    Incident, IncidentId, IncidentStatus, IncidentType, IncidentUpdate, Severity, UpdateId,
    UpdateType,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::handlers::{created, listing, ok, ok_with_message, parse_id};
use crate::state::AppState;

/// Author recorded on notes created through the API.
const SYSTEM_AUTHOR: &str = "System";

// ---------------------------------------------------------------------------
// Request bodies and query strings
// ---------------------------------------------------------------------------

/// Body of `POST /incidents`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateIncidentRequest {
    /// Short title (required).
    pub title: String,
    /// Description.
    pub description: String,
    /// Classification.
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    /// Assessed severity.
    pub severity: Severity,
    /// Latitude (required).
    pub latitude: Option<f64>,
    /// Longitude (required).
    pub longitude: Option<f64>,
    /// Place name.
    pub location_name: String,
    /// Street address.
    pub address: String,
    /// Country.
    pub country: String,
    /// Region.
    pub region: String,
    /// Reporter name.
    pub reporter_name: String,
    /// Reporter contact.
    pub reporter_contact: String,
    /// People affected.
    pub affected_people: u32,
    /// Casualties.
    pub casualties: u32,
    /// Images.
    pub image_urls: Vec<String>,
    /// Videos.
    pub video_urls: Vec<String>,
    /// Tags.
    pub tags: Vec<String>,
}

/// Body of `PATCH /incidents/{id}`. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateIncidentRequest {
    /// New status.
    pub status: Option<IncidentStatus>,
    /// New severity.
    pub severity: Option<Severity>,
    /// New affected count.
    pub affected_people: Option<u32>,
    /// New casualty count.
    pub casualties: Option<u32>,
    /// Optional note, stored as a `status_change` update.
    pub update_note: String,
}

/// Body of `POST /incidents/{id}/updates`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddUpdateRequest {
    /// Title.
    pub title: String,
    /// Body.
    pub description: String,
    /// Kind of note.
    pub update_type: UpdateType,
    /// Images.
    pub image_urls: Vec<String>,
}

/// Query string of `GET /incidents`.
#[derive(Debug, Default, Deserialize)]
pub struct IncidentsQuery {
    /// Status filter.
    pub status: Option<IncidentStatus>,
    /// Type filter.
    #[serde(rename = "type")]
    pub incident_type: Option<IncidentType>,
    /// Severity filter.
    pub severity: Option<Severity>,
    /// Verified filter.
    pub verified: Option<bool>,
    /// Page size (default 50).
    pub limit: Option<u32>,
    /// Records to skip.
    pub offset: Option<u32>,
}

/// Query string of `GET /map`. The box applies only when all four edges
/// are given.
#[derive(Debug, Default, Deserialize)]
pub struct MapQuery {
    /// Southern edge.
    pub min_lat: Option<f64>,
    /// Northern edge.
    pub max_lat: Option<f64>,
    /// Western edge.
    pub min_lon: Option<f64>,
    /// Eastern edge.
    pub max_lon: Option<f64>,
}

impl MapQuery {
    const fn bounds(&self) -> Option<MapBounds> {
        match (self.min_lat, self.max_lat, self.min_lon, self.max_lon) {
            (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => Some(MapBounds {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            }),
            _ => None,
        }
    }
}

/// Cached body of `GET /incidents/{id}`.
#[derive(Debug, Serialize, Deserialize)]
struct IncidentDetail {
    incident: Incident,
    updates: Vec<IncidentUpdate>,
}

async fn load_incident(state: &AppState, id: IncidentId) -> Result<Incident, ApiError> {
    state
        .store
        .get_incident(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Incident not found".to_owned()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Report a new incident.
pub async fn create_incident(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateIncidentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let mut missing = Vec::new();
    if req.title.trim().is_empty() {
        missing.push("title");
    }
    if req.latitude.is_none() {
        missing.push("latitude");
    }
    if req.longitude.is_none() {
        missing.push("longitude");
    }
    let coordinates = req.latitude.zip(req.longitude);
    let Some((latitude, longitude)) = coordinates.filter(|_| missing.is_empty()) else {
        return Err(ApiError::Validation {
            message: "Title, latitude, and longitude are required".to_owned(),
            missing,
        });
    };

    let now = Utc::now();
    let incident = Incident {
        id: IncidentId::new(),
        title: req.title,
        description: req.description,
        incident_type: req.incident_type,
        status: IncidentStatus::Reported,
        severity: req.severity,
        latitude,
        longitude,
        location_name: req.location_name,
        address: req.address,
        country: req.country,
        region: req.region,
        reporter_name: req.reporter_name,
        reporter_contact: req.reporter_contact,
        affected_people: req.affected_people,
        casualties: req.casualties,
        image_urls: req.image_urls,
        video_urls: req.video_urls,
        verified: false,
        verified_at: None,
        tags: req.tags,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_incident(&incident).await?;

    state.bus.publish(
        topics::INCIDENT_CREATED,
        &incident.id.to_string(),
        serde_json::json!({
            "incident_id": incident.id,
            "title": incident.title,
            "type": incident.incident_type,
            "severity": incident.severity,
            "latitude": incident.latitude,
            "longitude": incident.longitude,
            "timestamp": incident.created_at,
        }),
    );
    state
        .hub
        .broadcast_incident_update(incident.id, "created", &incident);
    info!(incident_id = %incident.id, severity = incident.severity.as_str(), "Incident reported");

    Ok(created("Incident reported successfully", incident))
}

/// List incidents, newest first.
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    query: Result<Query<IncidentsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let filter = IncidentFilter {
        status: params.status,
        incident_type: params.incident_type,
        severity: params.severity,
        verified: params.verified,
    };
    let page = Page::new(params.limit, params.offset);
    let result = state.store.list_incidents(&filter, page).await?;
    Ok(listing(result.items, result.total))
}

/// One incident with its updates, newest first. Served from the cache
/// when possible.
pub async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: IncidentId = parse_id(&id, "incident")?;
    let key = incident_key(id);

    if let Some(detail) = state.cache.get_json::<IncidentDetail>(&key).await {
        return Ok(ok(detail));
    }

    let incident = load_incident(&state, id).await?;
    let updates = state.store.list_updates(id).await?;
    let detail = IncidentDetail { incident, updates };
    state.cache.set_json(&key, &detail).await;
    Ok(ok(detail))
}

/// Change status, severity or counts, optionally recording a note.
pub async fn update_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateIncidentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: IncidentId = parse_id(&id, "incident")?;
    let mut incident = load_incident(&state, id).await?;
    let Json(req) = payload?;

    if let Some(status) = req.status {
        incident.status = status;
    }
    if let Some(severity) = req.severity {
        incident.severity = severity;
    }
    if let Some(affected) = req.affected_people {
        incident.affected_people = affected;
    }
    if let Some(casualties) = req.casualties {
        incident.casualties = casualties;
    }
    let now = Utc::now();
    incident.updated_at = now;
    state.store.update_incident(&incident).await?;

    if !req.update_note.trim().is_empty() {
        let note = IncidentUpdate {
            id: UpdateId::new(),
            incident_id: incident.id,
            title: "Status Update".to_owned(),
            description: req.update_note,
            update_type: UpdateType::StatusChange,
            author_name: SYSTEM_AUTHOR.to_owned(),
            image_urls: Vec::new(),
            created_at: now,
        };
        state.store.insert_update(&note).await?;
    }
    state.cache.invalidate(&incident_key(id)).await;

    state.bus.publish(
        topics::INCIDENT_UPDATED,
        &incident.id.to_string(),
        serde_json::json!({
            "incident_id": incident.id,
            "status": incident.status,
            "severity": incident.severity,
            "timestamp": now,
        }),
    );
    state
        .hub
        .broadcast_incident_update(incident.id, "updated", &incident);

    Ok(ok_with_message("Incident updated successfully", incident))
}

/// Mark an incident verified.
pub async fn verify_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: IncidentId = parse_id(&id, "incident")?;
    let mut incident = load_incident(&state, id).await?;

    let now = Utc::now();
    incident.verified = true;
    incident.verified_at = Some(now);
    incident.status = IncidentStatus::Verified;
    incident.updated_at = now;
    state.store.update_incident(&incident).await?;
    state.cache.invalidate(&incident_key(id)).await;
    info!(incident_id = %id, "Incident verified");

    Ok(ok_with_message("Incident verified successfully", incident))
}

/// Attach a progress note.
pub async fn add_incident_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AddUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: IncidentId = parse_id(&id, "incident")?;
    let Json(req) = payload?;
    load_incident(&state, id).await?;

    let update = IncidentUpdate {
        id: UpdateId::new(),
        incident_id: id,
        title: req.title,
        description: req.description,
        update_type: req.update_type,
        author_name: SYSTEM_AUTHOR.to_owned(),
        image_urls: req.image_urls,
        created_at: Utc::now(),
    };
    state.store.insert_update(&update).await?;
    state.cache.invalidate(&incident_key(id)).await;
    state.hub.broadcast_incident_update(id, "update_added", &update);

    Ok(created("Update added successfully", update))
}

/// Unresolved incidents, projected for the map.
pub async fn map_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MapQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let incidents = state.store.map_incidents(params.bounds()).await?;

    let points: Vec<serde_json::Value> = incidents
        .iter()
        .map(|inc| {
            serde_json::json!({
                "id": inc.id,
                "title": inc.title,
                "type": inc.incident_type,
                "severity": inc.severity,
                "status": inc.status,
                "latitude": inc.latitude,
                "longitude": inc.longitude,
                "location": inc.location_name,
                "verified": inc.verified,
                "created_at": inc.created_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "data": points,
        "count": points.len(),
        "center": {
            "latitude": state.config.map.center_lat,
            "longitude": state.config.map.center_lon,
            "zoom": state.config.map.zoom,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_bounds_need_all_four_edges() {
        let partial = MapQuery {
            min_lat: Some(-1.0),
            max_lat: Some(1.0),
            ..MapQuery::default()
        };
        assert!(partial.bounds().is_none());

        let full = MapQuery {
            min_lat: Some(-1.0),
            max_lat: Some(1.0),
            min_lon: Some(30.0),
            max_lon: Some(40.0),
        };
        assert!(full.bounds().is_some_and(|b| b.contains(0.0, 35.0)));
    }
}
