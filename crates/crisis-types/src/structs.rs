//! Core record types: incidents, incident updates, resources, alerts,
//! volunteers, and the volunteer matching request/result pair.
//!
//! These records are owned by the persistent store. The real-time layer
//! only reads them, sets broadcast status on alerts, and never caches them
//! beyond the lifetime of one request.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    AlertStatus, Category, Certainty, IncidentStatus, IncidentType, MessageType, Scope, Severity,
    UpdateType, Urgency,
};
use crate::ids::{AlertId, IncidentId, ResourceId, UpdateId, VolunteerId};

/// Suffix appended to an alert's CAP identifier to form the identifier of
/// the `Cancel` message that supersedes it.
pub const CANCEL_SUFFIX: &str = "-CANCEL";

/// Prefix of a cancellation headline.
pub const CANCELLED_HEADLINE_PREFIX: &str = "CANCELLED: ";

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// A crowd-sourced crisis incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Incident {
    /// Unique identifier.
    pub id: IncidentId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Classification.
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    /// Workflow status.
    pub status: IncidentStatus,
    /// Assessed severity.
    pub severity: Severity,
    /// WGS-84 latitude in degrees.
    pub latitude: f64,
    /// WGS-84 longitude in degrees.
    pub longitude: f64,
    /// Human-readable place name.
    pub location_name: String,
    /// Street address, if known.
    pub address: String,
    /// Country.
    pub country: String,
    /// Region within the country.
    pub region: String,
    /// Name of the person who reported it.
    pub reporter_name: String,
    /// How to reach the reporter.
    pub reporter_contact: String,
    /// Estimated number of people affected.
    pub affected_people: u32,
    /// Known casualties.
    pub casualties: u32,
    /// Attached images.
    pub image_urls: Vec<String>,
    /// Attached videos.
    pub video_urls: Vec<String>,
    /// Whether a coordinator confirmed the report.
    pub verified: bool,
    /// When the report was confirmed.
    pub verified_at: Option<DateTime<Utc>>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A progress note attached to an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncidentUpdate {
    /// Unique identifier.
    pub id: UpdateId,
    /// The incident this note belongs to.
    pub incident_id: IncidentId,
    /// Short title.
    pub title: String,
    /// Body of the note.
    pub description: String,
    /// Kind of note.
    pub update_type: UpdateType,
    /// Author display name.
    pub author_name: String,
    /// Attached images.
    pub image_urls: Vec<String>,
    /// When the note was written.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A relief resource that can be deployed to an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Resource {
    /// Unique identifier.
    pub id: ResourceId,
    /// Display name.
    pub name: String,
    /// Kind of resource (medical, shelter, food, water, transport, personnel).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Free-form description.
    pub description: String,
    /// Units on hand.
    pub quantity: u32,
    /// Whether the resource can be deployed.
    pub available: bool,
    /// Latitude of the resource's current location.
    pub latitude: f64,
    /// Longitude of the resource's current location.
    pub longitude: f64,
    /// Human-readable place name.
    pub location_name: String,
    /// Street address.
    pub address: String,
    /// Provider display name.
    pub provider_name: String,
    /// How to reach the provider.
    pub provider_contact: String,
    /// Providing organisation.
    pub organization: String,
    /// Incident the resource is deployed to.
    pub deployed_to: Option<IncidentId>,
    /// When it was deployed.
    pub deployed_at: Option<DateTime<Utc>>,
    /// When it was registered.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts (CAP 1.2)
// ---------------------------------------------------------------------------

/// A public warning in Common Alerting Protocol shape.
///
/// A `Cancel` alert always carries `<original identifier>-CANCEL` and the
/// same sender, scope, event and category as the alert it supersedes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Alert {
    /// Storage identifier.
    pub id: AlertId,
    /// CAP identifier, unique per message.
    pub identifier: String,
    /// Originator of the alert.
    pub sender: String,
    /// Issuance time.
    pub sent: DateTime<Utc>,
    /// Handling code.
    pub status: AlertStatus,
    /// Nature of the message.
    pub msg_type: MessageType,
    /// Intended distribution.
    pub scope: Scope,
    /// Subject event text (e.g. "Flood Warning").
    pub event: String,
    /// Subject event category.
    pub category: Category,
    /// Time available to prepare.
    pub urgency: Urgency,
    /// Intensity of impact.
    pub severity: Severity,
    /// Confidence in the observation.
    pub certainty: Certainty,
    /// Brief human-readable headline.
    pub headline: String,
    /// Extended description of the hazard.
    pub description: String,
    /// Recommended action.
    pub instruction: String,
    /// When the information becomes effective.
    pub effective: Option<DateTime<Utc>>,
    /// Expected onset of the hazard.
    pub onset: Option<DateTime<Utc>>,
    /// When the information stops being valid.
    pub expires: Option<DateTime<Utc>>,
    /// Textual description of the affected area.
    pub area_desc: String,
    /// Affected polygons as WGS-84 coordinate pair lists.
    pub polygons: Vec<String>,
    /// Affected circles as `lat,lon radius`.
    pub circles: Vec<String>,
    /// Related incident, if any.
    pub incident_id: Option<IncidentId>,
    /// Whether the alert was handed to the broadcast hub.
    pub broadcasted: bool,
    /// When that happened.
    pub broadcasted_at: Option<DateTime<Utc>>,
    /// Number of connected observers at broadcast time.
    pub recipients: u32,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Whether this record is itself a cancellation.
    pub fn is_cancellation(&self) -> bool {
        self.msg_type == MessageType::Cancel
    }

    /// CAP identifier a cancellation of this alert carries.
    pub fn cancel_identifier(&self) -> String {
        format!("{}{CANCEL_SUFFIX}", self.identifier)
    }

    /// Whether the alert is still in force at `now` (no expiry, or expiry
    /// in the future).
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

// ---------------------------------------------------------------------------
// Volunteers
// ---------------------------------------------------------------------------

/// A registered volunteer.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Volunteer {
    /// Unique identifier.
    pub id: VolunteerId,
    /// Full name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone.
    pub phone: String,
    /// Age in years.
    pub age: u32,
    /// Self-described gender.
    pub gender: String,
    /// Free-form skill tags (e.g. "medical", "logistics").
    pub skills: Vec<String>,
    /// Certifications held.
    pub certifications: Vec<String>,
    /// Spoken languages.
    pub languages: Vec<String>,
    /// Whether the volunteer has medical training.
    pub medical_training: bool,
    /// Home latitude.
    pub latitude: f64,
    /// Home longitude.
    pub longitude: f64,
    /// Human-readable place name.
    pub location_name: String,
    /// Street address.
    pub address: String,
    /// Country.
    pub country: String,
    /// Whether the volunteer can currently be deployed.
    pub available: bool,
    /// Free-form availability note.
    pub availability_note: String,
    /// Whether the volunteer is deployed right now.
    pub currently_deployed: bool,
    /// Incident the volunteer is deployed to.
    pub deployed_to: Option<IncidentId>,
    /// When the current deployment started.
    pub deployed_at: Option<DateTime<Utc>>,
    /// Whether a background check was completed.
    pub background_checked: bool,
    /// Number of past deployments.
    pub responses_count: u32,
    /// Total hours volunteered.
    pub hours_volunteered: f64,
    /// Last activity time.
    pub last_active_at: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Input to the volunteer matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MatchRequest {
    /// Incident the volunteers are being matched to.
    pub incident_id: IncidentId,
    /// Skills the incident needs.
    #[serde(default)]
    pub required_skills: BTreeSet<String>,
    /// Only consider volunteers with medical training.
    #[serde(default)]
    pub medical_required: bool,
    /// Radius beyond which distance stops contributing to the score.
    #[serde(default)]
    pub max_distance_km: f64,
}

/// One scored volunteer produced by the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MatchCandidate {
    /// The matched volunteer.
    pub volunteer: Volunteer,
    /// Additive fitness score, always positive for returned candidates.
    #[serde(rename = "match_score")]
    pub score: u32,
    /// Approximate distance to the incident.
    pub distance_km: f64,
    /// Human-readable reasons, one per scoring term that contributed.
    #[serde(rename = "match_reason")]
    pub reasons: Vec<String>,
}
