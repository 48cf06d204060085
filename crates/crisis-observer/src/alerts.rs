//! CAP alert endpoints. Issue and cancel go through the
//! [`AlertLifecycle`](crate::lifecycle::AlertLifecycle); reads go straight
//! to the store.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use crisis_db::{AlertFilter, Page};
use crisis_types::{AlertId, Category, Severity};
use serde::Deserialize;

use crate::error::ApiError;
use crate::handlers::{created, listing, ok_with_message, parse_id};
use crate::lifecycle::AlertRequest;
use crate::state::AppState;

/// Query string of `GET /alerts`.
#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    /// Only alerts that have not expired.
    #[serde(default)]
    pub active: bool,
    /// Severity filter.
    pub severity: Option<Severity>,
    /// Category filter.
    pub category: Option<Category>,
    /// Page size.
    pub limit: Option<u32>,
    /// Records to skip.
    pub offset: Option<u32>,
}

/// Issue an alert. The response carries the record as issued; the
/// broadcast follows on a background task.
pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let alert = state.alerts.issue(request).await?;
    Ok(created("Alert created successfully (CAP-compliant)", alert))
}

/// List alerts, most recently sent first.
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AlertsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let filter = AlertFilter {
        active_at: params.active.then(Utc::now),
        severity: params.severity,
        category: params.category,
    };
    let result = state
        .store
        .list_alerts(&filter, Page::new(params.limit, params.offset))
        .await?;
    Ok(listing(result.items, result.total))
}

/// One alert with its lifecycle state.
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: AlertId = parse_id(&id, "alert")?;
    let alert = state
        .store
        .get_alert(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert not found".to_owned()))?;
    let lifecycle = state.alerts.state(&alert).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": alert,
        "state": lifecycle,
    })))
}

/// Supersede an alert with a CAP `Cancel` message.
pub async fn cancel_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: AlertId = parse_id(&id, "alert")?;
    let cancel = state.alerts.cancel(id).await?;
    Ok(ok_with_message("Alert cancelled successfully", cancel))
}
