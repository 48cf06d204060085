//! Volunteer endpoints, including the HTTP surface of the matching engine.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use crisis_core::{match_volunteers, rank_by_score};
use crisis_db::{Page, VolunteerFilter};
use crisis_events::topics;
use crisis_types::{IncidentId, MatchRequest, Volunteer, VolunteerId};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::handlers::{created, listing, ok, ok_with_message, parse_id};
use crate::state::AppState;

/// Body of `POST /volunteers`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterVolunteerRequest {
    /// Full name (required).
    pub full_name: String,
    /// Email (required).
    pub email: String,
    /// Phone.
    pub phone: String,
    /// Age.
    pub age: u32,
    /// Gender.
    pub gender: String,
    /// Skills.
    pub skills: Vec<String>,
    /// Certifications.
    pub certifications: Vec<String>,
    /// Languages.
    pub languages: Vec<String>,
    /// Medical training.
    pub medical_training: bool,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Place name.
    pub location_name: String,
    /// Street address.
    pub address: String,
    /// Country.
    pub country: String,
}

/// Body of `POST /volunteers/{id}/deploy`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeployVolunteerRequest {
    /// Target incident.
    pub incident_id: String,
}

/// Body of `PATCH /volunteers/{id}/availability`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AvailabilityRequest {
    /// New availability.
    pub available: bool,
    /// Free-form note.
    pub availability_note: String,
}

/// Query string of `GET /volunteers`.
#[derive(Debug, Default, Deserialize)]
pub struct VolunteersQuery {
    /// Availability filter.
    pub available: Option<bool>,
    /// Medical training filter.
    pub medical_training: Option<bool>,
    /// Country filter.
    pub country: Option<String>,
    /// Page size.
    pub limit: Option<u32>,
    /// Records to skip.
    pub offset: Option<u32>,
}

/// Query string of `POST /volunteers/match`.
#[derive(Debug, Default, Deserialize)]
pub struct MatchQuery {
    /// Sort matches by score, highest first.
    #[serde(default)]
    pub rank: bool,
}

async fn load_volunteer(state: &AppState, id: VolunteerId) -> Result<Volunteer, ApiError> {
    state
        .store
        .get_volunteer(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Volunteer not found".to_owned()))
}

/// Register a volunteer. New volunteers are available.
pub async fn register_volunteer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterVolunteerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let missing: Vec<&'static str> = [("full_name", &req.full_name), ("email", &req.email)]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::Validation {
            message: "Full name and email are required".to_owned(),
            missing,
        });
    }

    let now = Utc::now();
    let volunteer = Volunteer {
        id: VolunteerId::new(),
        full_name: req.full_name,
        email: req.email,
        phone: req.phone,
        age: req.age,
        gender: req.gender,
        skills: req.skills,
        certifications: req.certifications,
        languages: req.languages,
        medical_training: req.medical_training,
        latitude: req.latitude,
        longitude: req.longitude,
        location_name: req.location_name,
        address: req.address,
        country: req.country,
        available: true,
        availability_note: String::new(),
        currently_deployed: false,
        deployed_to: None,
        deployed_at: None,
        background_checked: false,
        responses_count: 0,
        hours_volunteered: 0.0,
        last_active_at: None,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_volunteer(&volunteer).await?;

    state.bus.publish(
        topics::VOLUNTEER_REGISTERED,
        &volunteer.id.to_string(),
        serde_json::json!({
            "volunteer_id": volunteer.id,
            "full_name": volunteer.full_name,
            "skills": volunteer.skills,
            "medical_training": volunteer.medical_training,
            "location": volunteer.location_name,
            "timestamp": volunteer.created_at,
        }),
    );
    info!(volunteer_id = %volunteer.id, "Volunteer registered");

    Ok(created("Volunteer registered successfully", volunteer))
}

/// List volunteers, newest first.
pub async fn list_volunteers(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VolunteersQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let filter = VolunteerFilter {
        available: params.available,
        medical_training: params.medical_training,
        country: params.country.filter(|c| !c.is_empty()),
    };
    let result = state
        .store
        .list_volunteers(&filter, Page::new(params.limit, params.offset))
        .await?;
    Ok(listing(result.items, result.total))
}

/// One volunteer.
pub async fn get_volunteer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: VolunteerId = parse_id(&id, "volunteer")?;
    Ok(ok(load_volunteer(&state, id).await?))
}

/// Deploy a volunteer to an incident.
pub async fn deploy_volunteer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<DeployVolunteerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: VolunteerId = parse_id(&id, "volunteer")?;
    let mut volunteer = load_volunteer(&state, id).await?;

    let Json(req) = payload?;
    let incident_id: IncidentId = parse_id(&req.incident_id, "incident")?;
    if state.store.get_incident(incident_id).await?.is_none() {
        return Err(ApiError::NotFound("Incident not found".to_owned()));
    }

    let now = Utc::now();
    volunteer.currently_deployed = true;
    volunteer.deployed_to = Some(incident_id);
    volunteer.deployed_at = Some(now);
    volunteer.available = false;
    volunteer.responses_count = volunteer.responses_count.saturating_add(1);
    volunteer.last_active_at = Some(now);
    volunteer.updated_at = now;
    state.store.update_volunteer(&volunteer).await?;

    state
        .hub
        .broadcast_volunteer_update(volunteer.id, "deployed", &volunteer);
    info!(volunteer_id = %volunteer.id, incident_id = %incident_id, "Volunteer deployed");

    Ok(ok_with_message("Volunteer deployed successfully", volunteer))
}

/// Set availability and its note.
pub async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AvailabilityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: VolunteerId = parse_id(&id, "volunteer")?;
    let mut volunteer = load_volunteer(&state, id).await?;
    let Json(req) = payload?;

    volunteer.available = req.available;
    volunteer.availability_note = req.availability_note;
    volunteer.updated_at = Utc::now();
    state.store.update_volunteer(&volunteer).await?;

    Ok(ok_with_message("Availability updated successfully", volunteer))
}

/// Volunteers deployed to one incident.
pub async fn volunteers_by_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: IncidentId = parse_id(&id, "incident")?;
    let volunteers = state.store.volunteers_for_incident(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "count": volunteers.len(),
        "data": volunteers,
    })))
}

/// Score available volunteers for an incident.
///
/// Matches come back in pool order unless `?rank=true` is given.
pub async fn match_for_incident(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MatchQuery>, QueryRejection>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let Json(request) = payload?;

    let mut matches = match_volunteers(&state.store, &request).await?;
    if params.rank {
        rank_by_score(&mut matches);
    }

    Ok(ok(serde_json::json!({
        "incident_id": request.incident_id,
        "count": matches.len(),
        "matches": matches,
    })))
}
