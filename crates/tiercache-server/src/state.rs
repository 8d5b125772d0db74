//! Application state.

use crate::cache::{CacheCoordinator, ListenerStatus};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The two-tier cache of this instance.
    coordinator: CacheCoordinator,
    /// Subscription state of the invalidation listener.
    listener: ListenerStatus,
}

impl AppState {
    /// Creates a new AppState.
    pub fn new(coordinator: CacheCoordinator, listener: ListenerStatus) -> Self {
        Self {
            coordinator,
            listener,
        }
    }

    /// Returns the cache coordinator.
    pub fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }

    /// Returns the listener status.
    pub fn listener(&self) -> &ListenerStatus {
        &self.listener
    }
}
