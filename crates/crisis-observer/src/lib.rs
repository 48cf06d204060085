//! Real-time coordination subsystem and HTTP API for the Nexus
//! crisis-response service.
//!
//! State changes made through the API fan out to every connected observer
//! through a bounded, lossy broadcast queue drained by a single dispatcher.
//! Producers never wait on observers; slow or dead observers are evicted.
//!
//! # Architecture
//!
//! ```text
//! HTTP handlers / AlertLifecycle
//!         |
//!         | enqueue (non-blocking, drop on full)
//!         v
//!   BroadcastHub ==[bounded queue]==> Dispatcher
//!                                        |
//!                           snapshot per event
//!                                        v
//!                               ObserverRegistry
//!                               |             |
//!                          WsObserver   ChannelObserver
//! ```
//!
//! # Modules
//!
//! - [`connection`] -- Observer transports and the control protocol
//! - [`registry`] -- Connected observer set
//! - [`hub`] -- Broadcast queue and dispatcher
//! - [`lifecycle`] -- Alert issue, broadcast and cancel
//! - [`ws`] -- `WebSocket` endpoint
//! - [`incidents`], [`alerts`], [`resources`], [`volunteers`] -- REST handlers
//! - [`handlers`] -- Response helpers, health, real-time stats
//! - [`router`] -- Route table
//! - [`server`], [`startup`] -- Server lifecycle
//! - [`state`] -- Shared application state
//! - [`error`] -- Error types

pub mod alerts;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod incidents;
pub mod lifecycle;
pub mod registry;
pub mod resources;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod volunteers;
pub mod ws;

pub use connection::{ChannelObserver, Envelope, Observer};
pub use error::{AlertError, ApiError, DeliveryError};
pub use hub::{BroadcastHub, DispatchReport, Dispatcher, EnqueueOutcome};
pub use lifecycle::{AlertLifecycle, AlertRequest};
pub use registry::{ObserverHandle, ObserverRegistry};
pub use state::AppState;
