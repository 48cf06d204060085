//! Backend selection from infrastructure configuration.
//!
//! An empty URL turns a backend off. The record store is mandatory, so a
//! configured database that cannot be reached stops startup. The cache and
//! the event bus are optional: a failed connection is logged and the
//! feature runs disabled.

use crisis_core::CrisisConfig;
use crisis_db::{
    Cache, DbError, DragonflyCache, MemoryStore, PgStore, PostgresConfig, PostgresPool, Store,
};
use crisis_events::{EventBus, NatsBus};
use tracing::{info, warn};

/// Connect the record store.
///
/// Runs pending migrations when `PostgreSQL` is configured; otherwise
/// returns an empty in-memory store.
///
/// # Errors
///
/// Returns the [`DbError`] from connecting or migrating.
pub async fn connect_store(config: &CrisisConfig) -> Result<Store, DbError> {
    let url = config.infrastructure.postgres_url.trim();
    if url.is_empty() {
        warn!("No database URL configured, records are kept in memory only");
        return Ok(Store::from(MemoryStore::new()));
    }

    let pool = PostgresPool::connect(&PostgresConfig::new(url)).await?;
    pool.run_migrations().await?;
    Ok(Store::from(PgStore::new(pool)))
}

/// Connect the read-through cache, or return [`Cache::Disabled`].
pub async fn connect_cache(config: &CrisisConfig) -> Cache {
    let url = config.infrastructure.dragonfly_url.trim();
    if !config.cache.enabled || url.is_empty() {
        info!("Cache disabled");
        return Cache::Disabled;
    }

    match DragonflyCache::connect(url, config.cache.ttl_secs).await {
        Ok(cache) => Cache::Dragonfly(cache),
        Err(e) => {
            warn!(error = %e, "failed to connect to Dragonfly, caching disabled");
            Cache::Disabled
        }
    }
}

/// Connect the event bus, or return [`EventBus::Disabled`].
pub async fn connect_bus(config: &CrisisConfig) -> EventBus {
    let url = config.infrastructure.nats_url.trim();
    if url.is_empty() {
        info!("Event bus disabled");
        return EventBus::Disabled;
    }

    match NatsBus::connect(url, &config.infrastructure.nats_topic_prefix).await {
        Ok(bus) => EventBus::Nats(bus),
        Err(e) => {
            warn!(error = %e, "failed to connect to NATS, event publishing disabled");
            EventBus::Disabled
        }
    }
}
