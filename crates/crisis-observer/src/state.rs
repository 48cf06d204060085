//! Shared application state.
//!
//! [`AppState`] is the explicit context every handler receives: the store,
//! cache and event bus, plus the registry, hub and alert lifecycle that
//! make up the real-time layer. Nothing here is a process-wide global;
//! tests build as many independent states as they like.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crisis_core::CrisisConfig;
use crisis_db::{Cache, Store};
use crisis_events::EventBus;

use crate::hub::{BroadcastHub, Dispatcher};
use crate::lifecycle::AlertLifecycle;
use crate::registry::ObserverRegistry;

/// State shared by all handlers.
#[derive(Debug)]
pub struct AppState {
    /// Record store.
    pub store: Store,
    /// Read-through cache.
    pub cache: Cache,
    /// Downstream event bus.
    pub bus: EventBus,
    /// Connected observers.
    pub registry: Arc<ObserverRegistry>,
    /// Producer side of the broadcast queue.
    pub hub: BroadcastHub,
    /// Alert issue/broadcast/cancel.
    pub alerts: AlertLifecycle,
    /// Effective configuration.
    pub config: CrisisConfig,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the real-time layer over the given backends.
    ///
    /// Returns the state and the [`Dispatcher`] the caller must run (once)
    /// for broadcasts to reach observers.
    pub fn new(config: CrisisConfig, store: Store, cache: Cache, bus: EventBus) -> (Self, Dispatcher) {
        let registry = Arc::new(ObserverRegistry::new());
        let (hub, dispatcher) =
            BroadcastHub::new(Arc::clone(&registry), config.realtime.queue_capacity);
        let alerts = AlertLifecycle::new(
            store.clone(),
            bus.clone(),
            hub.clone(),
            Arc::clone(&registry),
            config.alerts.broadcast_enabled,
        );
        let state = Self {
            store,
            cache,
            bus,
            registry,
            hub,
            alerts,
            config,
            started_at: Utc::now(),
        };
        (state, dispatcher)
    }
}
