//! Shared type definitions for the Nexus crisis-response service.
//!
//! Records, identifiers and vocabularies used by every other crate in the
//! workspace. Types flow downstream to `TypeScript` via `ts-rs` for the
//! response dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all record identifiers
//! - [`enums`] -- Incident vocabulary and the CAP 1.2 alert vocabulary
//! - [`structs`] -- Incidents, resources, alerts, volunteers, matching

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AlertStatus, Category, Certainty, IncidentStatus, IncidentType, LifecycleState, MessageType,
    Scope, Severity, UpdateType, Urgency,
};
pub use ids::{AlertId, IncidentId, ResourceId, UpdateId, VolunteerId};
pub use structs::{
    Alert, CANCEL_SUFFIX, CANCELLED_HEADLINE_PREFIX, Incident, IncidentUpdate, MatchCandidate,
    MatchRequest, Resource, Volunteer,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::IncidentId::export_all();
        let _ = crate::ids::UpdateId::export_all();
        let _ = crate::ids::ResourceId::export_all();
        let _ = crate::ids::AlertId::export_all();
        let _ = crate::ids::VolunteerId::export_all();

        // Enums
        let _ = crate::enums::Severity::export_all();
        let _ = crate::enums::IncidentStatus::export_all();
        let _ = crate::enums::IncidentType::export_all();
        let _ = crate::enums::UpdateType::export_all();
        let _ = crate::enums::AlertStatus::export_all();
        let _ = crate::enums::MessageType::export_all();
        let _ = crate::enums::Scope::export_all();
        let _ = crate::enums::Category::export_all();
        let _ = crate::enums::Urgency::export_all();
        let _ = crate::enums::Certainty::export_all();
        let _ = crate::enums::LifecycleState::export_all();

        // Structs
        let _ = crate::structs::Incident::export_all();
        let _ = crate::structs::IncidentUpdate::export_all();
        let _ = crate::structs::Resource::export_all();
        let _ = crate::structs::Alert::export_all();
        let _ = crate::structs::Volunteer::export_all();
        let _ = crate::structs::MatchRequest::export_all();
        let _ = crate::structs::MatchCandidate::export_all();
    }
}
