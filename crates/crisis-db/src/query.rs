//! Query parameters shared by every store backend: pagination, per-record
//! filters, and the paged result wrapper.

use chrono::{DateTime, Utc};
use crisis_types::{Category, IncidentStatus, IncidentType, Severity};

/// Default page size when the caller does not provide one.
pub const DEFAULT_LIMIT: u32 = 50;

/// Limit/offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Number of records to skip.
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    /// Build a page from optional query parameters.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Apply this page to an already ordered sequence.
    pub fn apply<T>(self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = usize::try_from(self.limit).unwrap_or(usize::MAX);
        items.into_iter().skip(skip).take(take).collect()
    }
}

/// One page of records plus the number of records matching the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    /// Records on this page.
    pub items: Vec<T>,
    /// Total matching records across all pages.
    pub total: u64,
}

/// Filters for incident listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncidentFilter {
    /// Only incidents in this status.
    pub status: Option<IncidentStatus>,
    /// Only incidents of this type.
    pub incident_type: Option<IncidentType>,
    /// Only incidents with this severity.
    pub severity: Option<Severity>,
    /// Only verified (or unverified) incidents.
    pub verified: Option<bool>,
}

/// Bounding box for the incident map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl MapBounds {
    /// Whether a coordinate lies inside the box (edges inclusive).
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

/// Filters for alert listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertFilter {
    /// Only alerts that have not expired at this instant.
    pub active_at: Option<DateTime<Utc>>,
    /// Only alerts with this severity.
    pub severity: Option<Severity>,
    /// Only alerts in this category.
    pub category: Option<Category>,
}

/// Filters for resource listings.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Only resources of this type.
    pub resource_type: Option<String>,
    /// Only available (or unavailable) resources.
    pub available: Option<bool>,
}

/// Filters for volunteer listings.
#[derive(Debug, Clone, Default)]
pub struct VolunteerFilter {
    /// Only available (or unavailable) volunteers.
    pub available: Option<bool>,
    /// Only volunteers with (or without) medical training.
    pub medical_training: Option<bool>,
    /// Only volunteers in this country.
    pub country: Option<String>,
}
