//! Enumeration types for the crisis-response service.
//!
//! Incident vocabulary (status, type, severity) plus the Common Alerting
//! Protocol (CAP 1.2) vocabulary used by alert records. Enums that back a
//! filterable database column expose `as_str`, which is the exact text
//! stored in that column.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// Severity shared by incidents and alerts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Severity {
    /// Minor impact.
    Low,
    /// Noticeable impact; the default for new incident reports.
    #[default]
    Moderate,
    /// Significant threat to life or property.
    High,
    /// Extraordinary threat to life or property.
    Critical,
}

impl Severity {
    /// Column value for this severity.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Where an incident sits in its response workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum IncidentStatus {
    /// Reported by the public, not yet checked.
    #[default]
    Reported,
    /// Confirmed by a coordinator.
    Verified,
    /// Responders are deployed.
    Responding,
    /// The incident is over.
    Resolved,
    /// The report turned out to be false.
    FalseAlarm,
}

impl IncidentStatus {
    /// Column value for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reported => "reported",
            Self::Verified => "verified",
            Self::Responding => "responding",
            Self::Resolved => "resolved",
            Self::FalseAlarm => "false_alarm",
        }
    }
}

/// Broad classification of a crisis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum IncidentType {
    /// Earthquake, flood, storm, wildfire and similar.
    NaturalDisaster,
    /// Outbreaks and mass-casualty medical events.
    HealthEmergency,
    /// Armed conflict or civil unrest.
    Conflict,
    /// Failure of power, water, transport or communications.
    Infrastructure,
    /// Pollution, spills and other environmental hazards.
    Environmental,
    /// Anything else.
    #[default]
    Other,
}

impl IncidentType {
    /// Column value for this type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NaturalDisaster => "natural_disaster",
            Self::HealthEmergency => "health_emergency",
            Self::Conflict => "conflict",
            Self::Infrastructure => "infrastructure",
            Self::Environmental => "environmental",
            Self::Other => "other",
        }
    }
}

/// Kind of progress note attached to an incident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum UpdateType {
    /// Status or severity changed.
    StatusChange,
    /// New information from the field.
    #[default]
    NewInfo,
    /// Resources were moved or consumed.
    ResourceUpdate,
    /// The incident was resolved.
    Resolution,
}

// ---------------------------------------------------------------------------
// CAP alert vocabulary
// ---------------------------------------------------------------------------

/// CAP `status`: the handling code of an alert message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum AlertStatus {
    /// Actionable by all targeted recipients.
    #[default]
    Actual,
    /// Actionable only by designated exercise participants.
    Exercise,
    /// For messages that support alert network internal functions.
    System,
    /// Technical testing only, all recipients disregard.
    Test,
}

/// CAP `msgType`: the nature of the alert message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum MessageType {
    /// Initial information requiring attention.
    #[default]
    Alert,
    /// Updates and supersedes earlier messages.
    Update,
    /// Cancels earlier messages.
    Cancel,
}

/// CAP `scope`: intended distribution of the alert message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Scope {
    /// For general dissemination to unrestricted audiences.
    #[default]
    Public,
    /// For dissemination only to users with a known operational requirement.
    Restricted,
    /// For dissemination only to specified addresses.
    Private,
}

/// CAP `category` of the subject event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Category {
    /// Geophysical (including landslide).
    Geo,
    /// Meteorological (including flood).
    Met,
    /// General emergency and public safety.
    Safety,
    /// Law enforcement, military, homeland and local/private security.
    Security,
    /// Rescue and recovery.
    Rescue,
    /// Fire suppression and rescue.
    Fire,
    /// Medical and public health.
    Health,
    /// Pollution and other environmental.
    Env,
    /// Public and private transportation.
    Transport,
    /// Utility, telecommunication, other non-transport infrastructure.
    Infra,
    /// Chemical, biological, radiological, nuclear or high-yield explosive.
    #[serde(rename = "CBRNE")]
    Cbrne,
    /// Other events.
    #[default]
    Other,
}

impl Category {
    /// Column value for this category (the CAP spelling).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Geo => "Geo",
            Self::Met => "Met",
            Self::Safety => "Safety",
            Self::Security => "Security",
            Self::Rescue => "Rescue",
            Self::Fire => "Fire",
            Self::Health => "Health",
            Self::Env => "Env",
            Self::Transport => "Transport",
            Self::Infra => "Infra",
            Self::Cbrne => "CBRNE",
            Self::Other => "Other",
        }
    }
}

/// CAP `urgency`: time available to prepare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Urgency {
    /// Responsive action should be taken immediately.
    Immediate,
    /// Responsive action should be taken soon (within the next hour).
    Expected,
    /// Responsive action should be taken in the near future.
    Future,
    /// Responsive action is no longer required.
    Past,
    /// Urgency not known.
    #[default]
    Unknown,
}

/// CAP `certainty`: confidence in the observation or prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Certainty {
    /// Determined to have occurred or to be ongoing.
    Observed,
    /// Likely (p > ~50%).
    Likely,
    /// Possible but not likely (p <= ~50%).
    Possible,
    /// Not expected to occur (p ~ 0).
    Unlikely,
    /// Certainty unknown.
    #[default]
    Unknown,
}

/// Position of an alert record in its lifecycle.
///
/// `Draft -> Issued -> Broadcasted`, with `Cancelled` as a terminal branch.
/// The state is derived from the stored record and from the existence of a
/// later `Cancel` message referencing it; it is never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum LifecycleState {
    /// Validated request, not yet persisted.
    Draft,
    /// Persisted, broadcast pending.
    Issued,
    /// Delivered to the broadcast hub.
    Broadcasted,
    /// Superseded by a `Cancel` alert.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_matches_serde_spelling() {
        for severity in [
            Severity::Low,
            Severity::Moderate,
            Severity::High,
            Severity::Critical,
        ] {
            let json = serde_json::to_value(severity).unwrap_or_default();
            assert_eq!(json.as_str(), Some(severity.as_str()));
        }
        let json = serde_json::to_value(IncidentStatus::FalseAlarm).unwrap_or_default();
        assert_eq!(json.as_str(), Some(IncidentStatus::FalseAlarm.as_str()));
        let json = serde_json::to_value(Category::Cbrne).unwrap_or_default();
        assert_eq!(json.as_str(), Some("CBRNE"));
    }

    #[test]
    fn cap_vocabulary_uses_cap_capitalisation() {
        let json = serde_json::to_value(MessageType::Cancel).unwrap_or_default();
        assert_eq!(json.as_str(), Some("Cancel"));
        let json = serde_json::to_value(Urgency::Past).unwrap_or_default();
        assert_eq!(json.as_str(), Some("Past"));
    }

    #[test]
    fn severity_orders_by_impact() {
        assert!(Severity::Low < Severity::Critical);
        assert!(Severity::Moderate < Severity::High);
    }
}
