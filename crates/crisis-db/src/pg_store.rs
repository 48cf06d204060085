//! `PostgreSQL` record store.
//!
//! Every table stores the full record in a `record JSONB` column next to the
//! typed columns that listings filter and sort on. Reads select only the
//! JSONB column and deserialize it, so the Rust types remain the single
//! source of truth for record shape.

use crisis_types::{
    Alert, AlertId, Incident, IncidentId, IncidentStatus, IncidentUpdate, Resource, ResourceId,
    Volunteer, VolunteerId,
};
use serde::de::DeserializeOwned;
use sqlx::{Postgres, QueryBuilder};

use crate::error::DbError;
use crate::postgres::PostgresPool;
use crate::query::{
    AlertFilter, IncidentFilter, Listing, MapBounds, Page, ResourceFilter, VolunteerFilter,
};

/// Record store backed by a [`PostgresPool`].
#[derive(Clone)]
pub struct PgStore {
    pool: PostgresPool,
}

impl PgStore {
    /// Wrap a connected pool. Migrations must already have run.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    /// Return the underlying pool.
    pub const fn pool(&self) -> &PostgresPool {
        &self.pool
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    /// Insert a new incident.
    pub async fn insert_incident(&self, incident: &Incident) -> Result<(), DbError> {
        let record = serde_json::to_value(incident)?;
        sqlx::query(
            r"INSERT INTO incidents (id, status, incident_type, severity, verified, latitude, longitude, created_at, record)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(incident.id.into_inner())
        .bind(incident.status.as_str())
        .bind(incident.incident_type.as_str())
        .bind(incident.severity.as_str())
        .bind(incident.verified)
        .bind(incident.latitude)
        .bind(incident.longitude)
        .bind(incident.created_at)
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    /// Replace an existing incident.
    pub async fn update_incident(&self, incident: &Incident) -> Result<(), DbError> {
        let record = serde_json::to_value(incident)?;
        let result = sqlx::query(
            r"UPDATE incidents
              SET status = $2, incident_type = $3, severity = $4, verified = $5,
                  latitude = $6, longitude = $7, record = $8
              WHERE id = $1",
        )
        .bind(incident.id.into_inner())
        .bind(incident.status.as_str())
        .bind(incident.incident_type.as_str())
        .bind(incident.severity.as_str())
        .bind(incident.verified)
        .bind(incident.latitude)
        .bind(incident.longitude)
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("incident {}", incident.id)));
        }
        Ok(())
    }

    /// Fetch one incident.
    pub async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, DbError> {
        self.fetch_record("SELECT record FROM incidents WHERE id = $1", id.into_inner())
            .await
    }

    /// List incidents, newest first.
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: Page,
    ) -> Result<Listing<Incident>, DbError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM incidents WHERE TRUE");
        push_incident_filters(&mut count, *filter);
        let mut select = QueryBuilder::<Postgres>::new("SELECT record FROM incidents WHERE TRUE");
        push_incident_filters(&mut select, *filter);
        select.push(" ORDER BY created_at DESC, id DESC");
        self.fetch_listing(count, select, page).await
    }

    /// Unresolved incidents, optionally restricted to a bounding box.
    pub async fn map_incidents(&self, bounds: Option<MapBounds>) -> Result<Vec<Incident>, DbError> {
        let mut select =
            QueryBuilder::<Postgres>::new("SELECT record FROM incidents WHERE status <> ");
        select.push_bind(IncidentStatus::Resolved.as_str());
        if let Some(b) = bounds {
            select
                .push(" AND latitude BETWEEN ")
                .push_bind(b.min_lat)
                .push(" AND ")
                .push_bind(b.max_lat)
                .push(" AND longitude BETWEEN ")
                .push_bind(b.min_lon)
                .push(" AND ")
                .push_bind(b.max_lon);
        }
        select.push(" ORDER BY created_at DESC, id DESC");
        let rows: Vec<serde_json::Value> = select
            .build_query_scalar()
            .fetch_all(self.pool.pool())
            .await?;
        decode_all(rows)
    }

    // =========================================================================
    // Incident updates
    // =========================================================================

    /// Append a progress note.
    pub async fn insert_update(&self, update: &IncidentUpdate) -> Result<(), DbError> {
        let record = serde_json::to_value(update)?;
        sqlx::query(
            r"INSERT INTO incident_updates (id, incident_id, created_at, record)
              VALUES ($1, $2, $3, $4)",
        )
        .bind(update.id.into_inner())
        .bind(update.incident_id.into_inner())
        .bind(update.created_at)
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    /// Notes attached to an incident, newest first.
    pub async fn list_updates(&self, incident: IncidentId) -> Result<Vec<IncidentUpdate>, DbError> {
        self.fetch_records(
            r"SELECT record FROM incident_updates
              WHERE incident_id = $1
              ORDER BY created_at DESC, id DESC",
            incident.into_inner(),
        )
        .await
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert an alert. Fails with [`DbError::Duplicate`] if the CAP
    /// identifier is already taken.
    pub async fn insert_alert(&self, alert: &Alert) -> Result<(), DbError> {
        let record = serde_json::to_value(alert)?;
        sqlx::query(
            r"INSERT INTO alerts (id, identifier, severity, category, sent, expires, record)
              VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(alert.id.into_inner())
        .bind(&alert.identifier)
        .bind(alert.severity.as_str())
        .bind(alert.category.as_str())
        .bind(alert.sent)
        .bind(alert.expires)
        .bind(&record)
        .execute(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::Duplicate(alert.identifier.clone())
            }
            other => DbError::from(other),
        })?;
        Ok(())
    }

    /// Replace an existing alert.
    pub async fn update_alert(&self, alert: &Alert) -> Result<(), DbError> {
        let record = serde_json::to_value(alert)?;
        let result = sqlx::query(
            r"UPDATE alerts SET severity = $2, category = $3, expires = $4, record = $5
              WHERE id = $1",
        )
        .bind(alert.id.into_inner())
        .bind(alert.severity.as_str())
        .bind(alert.category.as_str())
        .bind(alert.expires)
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("alert {}", alert.id)));
        }
        Ok(())
    }

    /// Fetch one alert by storage id.
    pub async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, DbError> {
        self.fetch_record("SELECT record FROM alerts WHERE id = $1", id.into_inner())
            .await
    }

    /// Fetch one alert by CAP identifier.
    pub async fn find_alert_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Alert>, DbError> {
        let row: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT record FROM alerts WHERE identifier = $1")
                .bind(identifier)
                .fetch_optional(self.pool.pool())
                .await?;
        row.map(serde_json::from_value)
            .transpose()
            .map_err(DbError::from)
    }

    /// List alerts, most recently sent first.
    pub async fn list_alerts(
        &self,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Listing<Alert>, DbError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM alerts WHERE TRUE");
        push_alert_filters(&mut count, filter);
        let mut select = QueryBuilder::<Postgres>::new("SELECT record FROM alerts WHERE TRUE");
        push_alert_filters(&mut select, filter);
        select.push(" ORDER BY sent DESC, id DESC");
        self.fetch_listing(count, select, page).await
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Insert a new resource.
    pub async fn insert_resource(&self, resource: &Resource) -> Result<(), DbError> {
        let record = serde_json::to_value(resource)?;
        sqlx::query(
            r"INSERT INTO resources (id, resource_type, available, deployed_to, created_at, record)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(resource.id.into_inner())
        .bind(&resource.resource_type)
        .bind(resource.available)
        .bind(resource.deployed_to.map(IncidentId::into_inner))
        .bind(resource.created_at)
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    /// Replace an existing resource.
    pub async fn update_resource(&self, resource: &Resource) -> Result<(), DbError> {
        let record = serde_json::to_value(resource)?;
        let result = sqlx::query(
            r"UPDATE resources SET resource_type = $2, available = $3, deployed_to = $4, record = $5
              WHERE id = $1",
        )
        .bind(resource.id.into_inner())
        .bind(&resource.resource_type)
        .bind(resource.available)
        .bind(resource.deployed_to.map(IncidentId::into_inner))
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("resource {}", resource.id)));
        }
        Ok(())
    }

    /// Fetch one resource.
    pub async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>, DbError> {
        self.fetch_record("SELECT record FROM resources WHERE id = $1", id.into_inner())
            .await
    }

    /// List resources, newest first.
    pub async fn list_resources(
        &self,
        filter: &ResourceFilter,
        page: Page,
    ) -> Result<Listing<Resource>, DbError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM resources WHERE TRUE");
        push_resource_filters(&mut count, filter);
        let mut select = QueryBuilder::<Postgres>::new("SELECT record FROM resources WHERE TRUE");
        push_resource_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id DESC");
        self.fetch_listing(count, select, page).await
    }

    /// Resources deployed to an incident.
    pub async fn resources_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<Resource>, DbError> {
        self.fetch_records(
            r"SELECT record FROM resources
              WHERE deployed_to = $1
              ORDER BY created_at DESC, id DESC",
            incident.into_inner(),
        )
        .await
    }

    // =========================================================================
    // Volunteers
    // =========================================================================

    /// Insert a new volunteer.
    pub async fn insert_volunteer(&self, volunteer: &Volunteer) -> Result<(), DbError> {
        let record = serde_json::to_value(volunteer)?;
        sqlx::query(
            r"INSERT INTO volunteers (id, available, medical_training, country, deployed_to, created_at, record)
              VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(volunteer.id.into_inner())
        .bind(volunteer.available)
        .bind(volunteer.medical_training)
        .bind(&volunteer.country)
        .bind(volunteer.deployed_to.map(IncidentId::into_inner))
        .bind(volunteer.created_at)
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    /// Replace an existing volunteer.
    pub async fn update_volunteer(&self, volunteer: &Volunteer) -> Result<(), DbError> {
        let record = serde_json::to_value(volunteer)?;
        let result = sqlx::query(
            r"UPDATE volunteers
              SET available = $2, medical_training = $3, country = $4, deployed_to = $5, record = $6
              WHERE id = $1",
        )
        .bind(volunteer.id.into_inner())
        .bind(volunteer.available)
        .bind(volunteer.medical_training)
        .bind(&volunteer.country)
        .bind(volunteer.deployed_to.map(IncidentId::into_inner))
        .bind(&record)
        .execute(self.pool.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("volunteer {}", volunteer.id)));
        }
        Ok(())
    }

    /// Fetch one volunteer.
    pub async fn get_volunteer(&self, id: VolunteerId) -> Result<Option<Volunteer>, DbError> {
        self.fetch_record("SELECT record FROM volunteers WHERE id = $1", id.into_inner())
            .await
    }

    /// List volunteers, newest first.
    pub async fn list_volunteers(
        &self,
        filter: &VolunteerFilter,
        page: Page,
    ) -> Result<Listing<Volunteer>, DbError> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM volunteers WHERE TRUE");
        push_volunteer_filters(&mut count, filter);
        let mut select = QueryBuilder::<Postgres>::new("SELECT record FROM volunteers WHERE TRUE");
        push_volunteer_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id DESC");
        self.fetch_listing(count, select, page).await
    }

    /// Volunteers deployed to an incident.
    pub async fn volunteers_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<Volunteer>, DbError> {
        self.fetch_records(
            r"SELECT record FROM volunteers
              WHERE deployed_to = $1
              ORDER BY created_at DESC, id DESC",
            incident.into_inner(),
        )
        .await
    }

    /// The matching pool: available volunteers in registration order,
    /// optionally restricted to those with medical training.
    pub async fn available_volunteers(&self, medical_only: bool) -> Result<Vec<Volunteer>, DbError> {
        let mut select =
            QueryBuilder::<Postgres>::new("SELECT record FROM volunteers WHERE available = TRUE");
        if medical_only {
            select.push(" AND medical_training = TRUE");
        }
        select.push(" ORDER BY created_at ASC, id ASC");
        let rows: Vec<serde_json::Value> = select
            .build_query_scalar()
            .fetch_all(self.pool.pool())
            .await?;
        decode_all(rows)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn fetch_record<T: DeserializeOwned>(
        &self,
        sql: &'static str,
        id: uuid::Uuid,
    ) -> Result<Option<T>, DbError> {
        let row: Option<serde_json::Value> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;
        row.map(serde_json::from_value)
            .transpose()
            .map_err(DbError::from)
    }

    async fn fetch_records<T: DeserializeOwned>(
        &self,
        sql: &'static str,
        id: uuid::Uuid,
    ) -> Result<Vec<T>, DbError> {
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_all(self.pool.pool())
            .await?;
        decode_all(rows)
    }

    async fn fetch_listing<T: DeserializeOwned>(
        &self,
        mut count: QueryBuilder<'_, Postgres>,
        mut select: QueryBuilder<'_, Postgres>,
        page: Page,
    ) -> Result<Listing<T>, DbError> {
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool.pool())
            .await?;
        select
            .push(" LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));
        let rows: Vec<serde_json::Value> = select
            .build_query_scalar()
            .fetch_all(self.pool.pool())
            .await?;
        Ok(Listing {
            items: decode_all(rows)?,
            total: u64::try_from(total).unwrap_or(0),
        })
    }
}

fn decode_all<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<T>, DbError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DbError::from))
        .collect()
}

fn push_incident_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: IncidentFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(incident_type) = filter.incident_type {
        qb.push(" AND incident_type = ")
            .push_bind(incident_type.as_str());
    }
    if let Some(severity) = filter.severity {
        qb.push(" AND severity = ").push_bind(severity.as_str());
    }
    if let Some(verified) = filter.verified {
        qb.push(" AND verified = ").push_bind(verified);
    }
}

fn push_alert_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AlertFilter) {
    if let Some(now) = filter.active_at {
        qb.push(" AND (expires IS NULL OR expires > ")
            .push_bind(now)
            .push(")");
    }
    if let Some(severity) = filter.severity {
        qb.push(" AND severity = ").push_bind(severity.as_str());
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
}

fn push_resource_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ResourceFilter) {
    if let Some(resource_type) = &filter.resource_type {
        qb.push(" AND resource_type = ")
            .push_bind(resource_type.clone());
    }
    if let Some(available) = filter.available {
        qb.push(" AND available = ").push_bind(available);
    }
}

fn push_volunteer_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &VolunteerFilter) {
    if let Some(available) = filter.available {
        qb.push(" AND available = ").push_bind(available);
    }
    if let Some(medical) = filter.medical_training {
        qb.push(" AND medical_training = ").push_bind(medical);
    }
    if let Some(country) = &filter.country {
        qb.push(" AND country = ").push_bind(country.clone());
    }
}
