//! Data layer for the Nexus crisis-response service (`PostgreSQL` +
//! `Dragonfly`).
//!
//! `PostgreSQL` is the durable record store. An in-memory backend with the
//! same surface stands in when no database is configured. `Dragonfly` is an
//! optional TTL cache whose failures never reach callers.
//!
//! # Architecture
//!
//! ```text
//! API handlers
//!     |
//!     +-- Store ------+-- PgStore     (PostgresPool, JSONB records)
//!     |               +-- MemoryStore (tests, local runs)
//!     |
//!     +-- Cache ------+-- DragonflyCache (TTL, best effort)
//!                     +-- Disabled
//! ```
//!
//! # Modules
//!
//! - [`store`] -- Backend-agnostic record store
//! - [`pg_store`] -- `PostgreSQL` record store
//! - [`memory`] -- In-memory record store
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`cache`] -- `Dragonfly` read-through cache
//! - [`query`] -- Pagination and listing filters
//! - [`error`] -- Shared error types

pub mod cache;
pub mod error;
pub mod memory;
pub mod pg_store;
pub mod postgres;
pub mod query;
pub mod store;

// Re-export primary types for convenience.
pub use cache::{Cache, DragonflyCache, incident_key};
pub use error::DbError;
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use postgres::{PostgresConfig, PostgresPool};
pub use query::{
    AlertFilter, IncidentFilter, Listing, MapBounds, Page, ResourceFilter, VolunteerFilter,
};
pub use store::Store;
