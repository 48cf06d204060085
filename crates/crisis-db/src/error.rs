//! Error type shared by the record stores and the cache.
//!
//! Outage-shaped `sqlx` failures (pool exhausted or closed, socket errors)
//! become [`DbError::Unavailable`] so the API can answer 503 rather than
//! 500. Everything else from `PostgreSQL` stays [`DbError::Postgres`].

/// Errors from the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A query failed for a reason other than an outage.
    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

    /// Applying the schema failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A Dragonfly command failed. Only seen by the cache wrapper, which
    /// logs and swallows it.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored record could not be encoded or decoded as JSON.
    #[error("record encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An update targeted a record that does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// An insert reused a unique key, such as a CAP alert identifier.
    #[error("{0} already exists")]
    Duplicate(String),

    /// The store cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A connection URL could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            Self::Unavailable(err.to_string())
        } else {
            Self::Postgres(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_an_outage() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Unavailable(_)));
    }

    #[test]
    fn query_errors_stay_postgres() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Postgres(_)));
    }

    #[test]
    fn duplicate_names_the_key() {
        let err = DbError::Duplicate("alert nexus-crisis-NWS-1-0-CANCEL".to_owned());
        assert_eq!(
            err.to_string(),
            "alert nexus-crisis-NWS-1-0-CANCEL already exists"
        );
    }
}
