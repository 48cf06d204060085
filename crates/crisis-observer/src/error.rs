//! Error types for the real-time layer and the HTTP API.
//!
//! [`DeliveryError`] and [`AlertError`] are domain errors raised inside the
//! crate. [`ApiError`] is the single HTTP-facing enum; it converts into an
//! Axum response via its [`IntoResponse`] implementation and renders
//! `{"success": false, "error": ..., "status": ...}`.

use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crisis_core::MatchError;
use crisis_db::DbError;
use crisis_types::AlertId;

/// Failure writing one message to one observer.
///
/// Contained in the broadcast hub: the observer is evicted and the
/// producer never sees it.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The observer's connection is already closed.
    #[error("observer connection closed")]
    Closed,

    /// The write did not complete in time.
    #[error("observer write timed out after {0:?}")]
    Timeout(Duration),

    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(String),

    /// The envelope could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the alert lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// Required CAP fields were empty.
    #[error("missing required fields: {}", missing.join(", "))]
    Validation {
        /// Names of the empty fields, in request order.
        missing: Vec<&'static str>,
    },

    /// No alert with this id exists.
    #[error("alert {0} not found")]
    NotFound(AlertId),

    /// The requested transition is not allowed from the alert's state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store rejected a read or write.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Required fields were missing or invalid.
    #[error("{message}")]
    Validation {
        /// Human-readable summary.
        message: String,
        /// Names of the offending fields.
        missing: Vec<&'static str>,
    },

    /// The request body or query string could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    /// A path or body identifier was not a UUID.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// The referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with the current state of a record.
    #[error("{0}")]
    Conflict(String),

    /// A required backend is unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The store failed.
    #[error("store error: {0}")]
    Store(DbError),
}

impl ApiError {
    /// Validation failure listing the missing fields.
    pub fn missing_fields(missing: Vec<&'static str>) -> Self {
        Self::Validation {
            message: format!("missing required fields: {}", missing.join(", ")),
            missing,
        }
    }

    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BadRequest(_) | Self::InvalidId(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            DbError::Duplicate(what) => Self::Conflict(format!("{what} already exists")),
            DbError::Unavailable(what) => Self::Unavailable(what),
            other => Self::Store(other),
        }
    }
}

impl From<AlertError> for ApiError {
    fn from(error: AlertError) -> Self {
        match error {
            AlertError::Validation { missing } => Self::Validation {
                message: "Sender, event, and description are required (CAP standard)".to_owned(),
                missing,
            },
            AlertError::NotFound(_) => Self::NotFound("Alert not found".to_owned()),
            AlertError::Conflict(message) => Self::Conflict(message),
            AlertError::Store(e) => Self::from(e),
        }
    }
}

impl From<MatchError> for ApiError {
    fn from(error: MatchError) -> Self {
        match error {
            MatchError::IncidentNotFound(_) => Self::NotFound("Incident not found".to_owned()),
            MatchError::Store(e) => Self::from(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        Self::BadRequest("Invalid request body".to_owned())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(format!("Invalid query: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Store(e) = &self {
            tracing::error!(error = %e, "store failure while handling request");
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        if let Self::Validation { missing, .. } = &self
            && let Some(map) = body.as_object_mut()
        {
            map.insert("missing".to_owned(), serde_json::json!(missing));
        }

        (status, axum::Json(body)).into_response()
    }
}
