//! Shared response helpers plus the health and real-time stats endpoints.
//!
//! Successful responses use the envelope `{"success": true, "data": ...}`,
//! optionally with `message`, `total` or `count`. Failures are rendered by
//! [`ApiError`].

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// `{"success": true, "data": data}`.
pub fn ok(data: impl Serialize) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data,
    }))
}

/// `{"success": true, "message": message, "data": data}`.
pub fn ok_with_message(message: &str, data: impl Serialize) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": message,
        "data": data,
    }))
}

/// `201 Created` with a message envelope.
pub fn created(message: &str, data: impl Serialize) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::CREATED, ok_with_message(message, data))
}

/// A page of records with the unpaged total.
pub fn listing(items: impl Serialize, total: u64) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": items,
        "total": total,
    }))
}

/// Parse a path or body identifier into a typed id.
pub fn parse_id<T: From<Uuid>>(raw: &str, what: &str) -> Result<T, ApiError> {
    Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| ApiError::InvalidId(format!("Invalid {what} ID: {e}")))
}

/// Liveness probe.
///
/// # Route
///
/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "crisis-service",
        "timestamp": Utc::now(),
        "store": state.store.backend(),
        "event_bus": state.bus.backend(),
        "cache_enabled": state.cache.is_enabled(),
    }))
}

/// Real-time layer counters.
///
/// # Route
///
/// `GET /api/v1/crisis/ws/stats`
pub async fn ws_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": {
            "connected_clients": state.registry.count().await,
            "broadcast_queue": state.hub.queued_len(),
            "queue_capacity": state.hub.capacity(),
            "dropped_events": state.hub.dropped_count(),
        },
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crisis_types::IncidentId;

    #[test]
    fn parse_id_accepts_uuid() {
        let id = IncidentId::new();
        let parsed: IncidentId = parse_id(&id.to_string(), "incident").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        let result: Result<IncidentId, ApiError> = parse_id("nope", "incident");
        assert!(matches!(result, Err(ApiError::InvalidId(ref m)) if m.starts_with("Invalid incident ID")));
    }

    #[test]
    fn listing_carries_total() {
        let Json(body) = listing(vec![1, 2], 7);
        assert_eq!(body["success"], true);
        assert_eq!(body["total"], 7);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    }
}
