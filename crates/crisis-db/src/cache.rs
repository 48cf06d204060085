//! Optional `Dragonfly` (Redis-compatible) read-through cache.
//!
//! The cache is opportunistic: every failure is logged and swallowed, so a
//! missing or unhealthy `Dragonfly` never prevents a request from being
//! served from the persistent store.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `incident:{id}` | JSON | Incident detail with its updates |

use fred::prelude::*;
use fred::types::Expiration;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crisis_types::IncidentId;

use crate::error::DbError;

/// Default time-to-live for cached entries, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// Cache key for an incident detail view.
pub fn incident_key(id: IncidentId) -> String {
    format!("incident:{id}")
}

/// Connection handle to a `Dragonfly` instance.
#[derive(Clone)]
pub struct DragonflyCache {
    client: Client,
    ttl_secs: u64,
}

impl DragonflyCache {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!(ttl_secs, "Connected to Dragonfly");
        Ok(Self { client, ttl_secs })
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let _: () = self
            .client
            .set(key, json.as_str(), Some(Expiration::EX(ttl)), None, false)
            .await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }
}

/// The configured cache: `Dragonfly`, or nothing.
#[derive(Clone)]
pub enum Cache {
    /// Entries are kept in `Dragonfly` with a TTL.
    Dragonfly(DragonflyCache),
    /// Caching is turned off; every lookup misses.
    Disabled,
}

impl Cache {
    /// Look up `key`. Misses, decode failures and outages all return `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self {
            Self::Dragonfly(cache) => match cache.get_json(key).await {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!(key, error = %e, "Cache read failed");
                    None
                }
            },
            Self::Disabled => None,
        }
    }

    /// Store `value` at `key`. Failures are logged.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) {
        if let Self::Dragonfly(cache) = self
            && let Err(e) = cache.set_json(key, value).await
        {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Drop `key`. Failures are logged.
    pub async fn invalidate(&self, key: &str) {
        if let Self::Dragonfly(cache) = self
            && let Err(e) = cache.delete(key).await
        {
            tracing::warn!(key, error = %e, "Cache invalidation failed");
        }
    }

    /// Whether a backend is configured.
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Dragonfly(_))
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dragonfly(cache) => f
                .debug_struct("Cache")
                .field("backend", &"dragonfly")
                .field("ttl_secs", &cache.ttl_secs)
                .finish_non_exhaustive(),
            Self::Disabled => f.write_str("Cache::Disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incident_keys_are_namespaced() {
        let id = IncidentId::new();
        assert_eq!(incident_key(id), format!("incident:{id}"));
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = Cache::Disabled;
        cache.set_json("incident:x", &42_u32).await;
        let hit: Option<u32> = cache.get_json("incident:x").await;
        assert!(hit.is_none());
        assert!(!cache.is_enabled());
    }
}
