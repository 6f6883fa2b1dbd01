//! Provider-side container lifecycle tracking.
//!
//! Claude's programmatic-tool sessions allocate a container with an expiry.
//! The manager remembers them so a follow-up run can resume one instead of
//! paying cold-start, and forgets them once expired.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct TrackedContainer {
    pub container_id: String,
    pub expires_at: DateTime<Utc>,
    pub session_id: String,
}

#[derive(Default)]
pub struct ContainerManager {
    containers: Mutex<HashMap<String, TrackedContainer>>,
}

impl ContainerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, container_id: &str, expires_at: DateTime<Utc>, session_id: &str) {
        self.containers.lock().insert(
            container_id.to_string(),
            TrackedContainer {
                container_id: container_id.to_string(),
                expires_at,
                session_id: session_id.to_string(),
            },
        );
        tracing::debug!(container_id, %expires_at, "registered container");
    }

    /// Look up a container, returning `None` for expired ones (which are
    /// dropped on the way out).
    pub fn get(&self, container_id: &str) -> Option<TrackedContainer> {
        let mut containers = self.containers.lock();
        match containers.get(container_id) {
            Some(c) if c.expires_at > Utc::now() => Some(c.clone()),
            Some(_) => {
                containers.remove(container_id);
                tracing::debug!(container_id, "container expired, dropped");
                None
            }
            None => None,
        }
    }

    /// Drop every expired container. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut containers = self.containers.lock();
        let before = containers.len();
        containers.retain(|_, c| c.expires_at > now);
        before - containers.len()
    }

    pub fn len(&self) -> usize {
        self.containers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn live_container_is_returned() {
        let mgr = ContainerManager::new();
        mgr.register("c1", Utc::now() + Duration::minutes(10), "s1");
        assert!(mgr.get("c1").is_some());
    }

    #[test]
    fn expired_container_is_dropped_on_access() {
        let mgr = ContainerManager::new();
        mgr.register("c1", Utc::now() - Duration::minutes(1), "s1");
        assert!(mgr.get("c1").is_none());
        assert!(mgr.is_empty());
    }

    #[test]
    fn sweep_clears_expired_only() {
        let mgr = ContainerManager::new();
        mgr.register("old", Utc::now() - Duration::minutes(1), "s1");
        mgr.register("new", Utc::now() + Duration::minutes(10), "s2");
        assert_eq!(mgr.sweep(), 1);
        assert_eq!(mgr.len(), 1);
    }
}
