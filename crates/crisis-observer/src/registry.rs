//! The set of currently connected observers.
//!
//! One reader/writer lock guards the whole set. [`ObserverRegistry::snapshot`]
//! copies the membership out so the hub can write to observers without
//! holding the lock across I/O.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use crate::connection::Observer;

/// Identity of one registered observer. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    /// Numeric connection id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Thread-safe registry of connected observers.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    observers: RwLock<BTreeMap<ObserverHandle, Arc<Observer>>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer and return its handle.
    pub async fn register(&self, observer: Arc<Observer>) -> ObserverHandle {
        let handle = ObserverHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers.write().await;
        observers.insert(handle, observer);
        debug!(connection = %handle, clients = observers.len(), "observer registered");
        handle
    }

    /// Remove an observer. Returns it if it was still registered; calling
    /// this twice is harmless.
    pub async fn unregister(&self, handle: ObserverHandle) -> Option<Arc<Observer>> {
        let mut observers = self.observers.write().await;
        let removed = observers.remove(&handle);
        if removed.is_some() {
            debug!(connection = %handle, clients = observers.len(), "observer unregistered");
        }
        removed
    }

    /// Copy of the current membership in registration order.
    pub async fn snapshot(&self) -> Vec<(ObserverHandle, Arc<Observer>)> {
        self.observers
            .read()
            .await
            .iter()
            .map(|(handle, observer)| (*handle, Arc::clone(observer)))
            .collect()
    }

    /// Number of registered observers.
    pub async fn count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Whether `handle` is currently registered.
    pub async fn contains(&self, handle: ObserverHandle) -> bool {
        self.observers.read().await.contains_key(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelObserver;

    fn channel_observer() -> Arc<Observer> {
        let (observer, _rx) = ChannelObserver::new(1);
        Arc::new(Observer::from(observer))
    }

    #[tokio::test]
    async fn register_assigns_distinct_handles() {
        let registry = ObserverRegistry::new();
        let a = registry.register(channel_observer()).await;
        let b = registry.register(channel_observer()).await;
        assert_ne!(a, b);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ObserverRegistry::new();
        let handle = registry.register(channel_observer()).await;

        assert!(registry.unregister(handle).await.is_some());
        assert!(registry.unregister(handle).await.is_none());
        assert_eq!(registry.count().await, 0);
        assert!(!registry.contains(handle).await);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_mutation() {
        let registry = ObserverRegistry::new();
        let first = registry.register(channel_observer()).await;
        let snapshot = registry.snapshot().await;

        registry.register(channel_observer()).await;
        registry.unregister(first).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.first().map(|(h, _)| *h), Some(first));
        assert_eq!(registry.count().await, 1);
    }

    #[test]
    fn handle_display_is_prefixed() {
        assert_eq!(ObserverHandle(7).to_string(), "conn-7");
        assert_eq!(ObserverHandle(7).get(), 7);
    }
}
