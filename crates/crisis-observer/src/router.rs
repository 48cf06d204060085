//! Axum router construction.
//!
//! Assembles the REST API and the `WebSocket` endpoint into a single
//! [`Router`] with CORS enabled for the response dashboard.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{alerts, handlers, incidents, resources, volunteers, ws};

/// Prefix of every API route.
pub const API_PREFIX: &str = "/api/v1/crisis";

/// Build the complete router.
///
/// - `GET /health`
/// - `GET /api/v1/crisis/ws` and `GET /api/v1/crisis/ws/stats`
/// - incidents, map, alerts, resources, volunteers and matching under
///   `/api/v1/crisis`
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Real-time
        .route("/ws", get(ws::ws_handler))
        .route("/ws/stats", get(handlers::ws_stats))
        // Incidents
        .route(
            "/incidents",
            post(incidents::create_incident).get(incidents::list_incidents),
        )
        .route(
            "/incidents/{id}",
            get(incidents::get_incident).patch(incidents::update_incident),
        )
        .route("/incidents/{id}/verify", post(incidents::verify_incident))
        .route("/incidents/{id}/updates", post(incidents::add_incident_update))
        .route(
            "/incidents/{id}/resources",
            get(resources::resources_by_incident),
        )
        .route(
            "/incidents/{id}/volunteers",
            get(volunteers::volunteers_by_incident),
        )
        .route("/map", get(incidents::map_data))
        // Alerts
        .route(
            "/alerts",
            post(alerts::create_alert).get(alerts::list_alerts),
        )
        .route("/alerts/{id}", get(alerts::get_alert))
        .route("/alerts/{id}/cancel", post(alerts::cancel_alert))
        // Resources
        .route(
            "/resources",
            post(resources::register_resource).get(resources::list_resources),
        )
        .route("/resources/{id}", get(resources::get_resource))
        .route("/resources/{id}/deploy", post(resources::deploy_resource))
        // Volunteers
        .route(
            "/volunteers",
            post(volunteers::register_volunteer).get(volunteers::list_volunteers),
        )
        .route("/volunteers/match", post(volunteers::match_for_incident))
        .route("/volunteers/{id}", get(volunteers::get_volunteer))
        .route("/volunteers/{id}/deploy", post(volunteers::deploy_volunteer))
        .route(
            "/volunteers/{id}/availability",
            patch(volunteers::update_availability),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest(API_PREFIX, api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
