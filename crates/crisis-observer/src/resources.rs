//! Relief resource endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use crisis_db::{Page, ResourceFilter};
use crisis_events::topics;
use crisis_types::{IncidentId, Resource, ResourceId};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::handlers::{created, listing, ok, ok_with_message, parse_id};
use crate::state::AppState;

/// Body of `POST /resources`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterResourceRequest {
    /// Display name (required).
    pub name: String,
    /// Kind of resource (required).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Description.
    pub description: String,
    /// Units on hand.
    pub quantity: u32,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Place name.
    pub location_name: String,
    /// Street address.
    pub address: String,
    /// Provider name.
    pub provider_name: String,
    /// Provider contact.
    pub provider_contact: String,
    /// Organisation.
    pub organization: String,
}

/// Body of `POST /resources/{id}/deploy`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeployResourceRequest {
    /// Target incident.
    pub incident_id: String,
    /// Units being sent.
    pub quantity: u32,
}

/// Query string of `GET /resources`.
#[derive(Debug, Default, Deserialize)]
pub struct ResourcesQuery {
    /// Type filter.
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    /// Availability filter.
    pub available: Option<bool>,
    /// Page size.
    pub limit: Option<u32>,
    /// Records to skip.
    pub offset: Option<u32>,
}

/// Register a resource. New resources are available.
pub async fn register_resource(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterResourceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let missing: Vec<&'static str> = [("name", &req.name), ("type", &req.resource_type)]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::Validation {
            message: "Name and type are required".to_owned(),
            missing,
        });
    }

    let now = Utc::now();
    let resource = Resource {
        id: ResourceId::new(),
        name: req.name,
        resource_type: req.resource_type,
        description: req.description,
        quantity: req.quantity,
        available: true,
        latitude: req.latitude,
        longitude: req.longitude,
        location_name: req.location_name,
        address: req.address,
        provider_name: req.provider_name,
        provider_contact: req.provider_contact,
        organization: req.organization,
        deployed_to: None,
        deployed_at: None,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_resource(&resource).await?;
    info!(resource_id = %resource.id, resource_type = %resource.resource_type, "Resource registered");

    Ok(created("Resource registered successfully", resource))
}

/// List resources, newest first.
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ResourcesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let filter = ResourceFilter {
        resource_type: params.resource_type.filter(|t| !t.is_empty()),
        available: params.available,
    };
    let result = state
        .store
        .list_resources(&filter, Page::new(params.limit, params.offset))
        .await?;
    Ok(listing(result.items, result.total))
}

/// One resource.
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ResourceId = parse_id(&id, "resource")?;
    let resource = state
        .store
        .get_resource(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Resource not found".to_owned()))?;
    Ok(ok(resource))
}

/// Deploy a resource to an incident.
pub async fn deploy_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<DeployResourceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ResourceId = parse_id(&id, "resource")?;
    let mut resource = state
        .store
        .get_resource(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Resource not found".to_owned()))?;

    let Json(req) = payload?;
    let incident_id: IncidentId = parse_id(&req.incident_id, "incident")?;
    if state.store.get_incident(incident_id).await?.is_none() {
        return Err(ApiError::NotFound("Incident not found".to_owned()));
    }

    let now = Utc::now();
    resource.deployed_to = Some(incident_id);
    resource.deployed_at = Some(now);
    resource.available = false;
    resource.updated_at = now;
    state.store.update_resource(&resource).await?;

    state.bus.publish(
        topics::RESOURCE_DEPLOYED,
        &resource.id.to_string(),
        serde_json::json!({
            "resource_id": resource.id,
            "incident_id": incident_id,
            "type": resource.resource_type,
            "quantity": req.quantity,
            "timestamp": now,
        }),
    );
    state
        .hub
        .broadcast_resource_update(resource.id, "deployed", &resource);
    info!(resource_id = %resource.id, incident_id = %incident_id, "Resource deployed");

    Ok(ok_with_message("Resource deployed successfully", resource))
}

/// Resources deployed to one incident.
pub async fn resources_by_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: IncidentId = parse_id(&id, "incident")?;
    let resources = state.store.resources_for_incident(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "count": resources.len(),
        "data": resources,
    })))
}
