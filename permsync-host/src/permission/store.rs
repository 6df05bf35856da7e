//! Observable store of currently granted permissions
//!
//! Single source of truth for "what is granted right now". The store is
//! constructed once at startup and shared by `Arc` with every component that
//! reads or updates it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

use super::id::{GrantResult, PermissionId, PermissionSet};

/// Error type for permission state store operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Grant result length mismatch: {permissions} permissions, {results} results")]
    LengthMismatch { permissions: usize, results: usize },
}

/// Handle returned by [`PermissionStateStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&PermissionSet) + Send + Sync>;

/// Observable holder of the granted-permission set
pub struct PermissionStateStore {
    current: RwLock<Arc<PermissionSet>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl PermissionStateStore {
    /// Create a store holding the empty set
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(PermissionSet::new())),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Latest published set
    pub fn current(&self) -> Arc<PermissionSet> {
        Arc::clone(&*self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a subscriber notified on every publish
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&PermissionSet) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(subscriber)));
        id
    }

    /// Register a subscriber and deliver the current value to it immediately
    pub fn observe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&PermissionSet) + Send + Sync + 'static,
    {
        let snapshot = self.current();
        subscriber(&snapshot);
        self.subscribe(subscriber)
    }

    /// Remove a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish `set` if it differs from the current value.
    ///
    /// Returns whether a publish (and thus a notification) happened.
    pub fn replace(&self, set: PermissionSet) -> bool {
        let published = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if **current == set {
                return false;
            }
            *current = Arc::new(set);
            Arc::clone(&*current)
        };

        tracing::debug!(granted = published.len(), "Publishing permission set");

        // Notify with no lock held so subscribers may read the store.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(&published);
        }
        true
    }

    /// Fold a parallel grant/deny batch into the current set and publish it.
    ///
    /// Both slices must have the same length; on mismatch nothing is applied.
    pub fn apply_grant_result(
        &self,
        permissions: &[PermissionId],
        results: &[GrantResult],
    ) -> Result<bool, StoreError> {
        if permissions.len() != results.len() {
            return Err(StoreError::LengthMismatch {
                permissions: permissions.len(),
                results: results.len(),
            });
        }

        let mut working = PermissionSet::clone(&self.current());
        for (permission, result) in permissions.iter().zip(results) {
            if result.is_granted() {
                working.insert(permission.clone());
            } else {
                working.remove(permission);
            }
        }
        Ok(self.replace(working))
    }
}

impl Default for PermissionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PermissionStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionStateStore")
            .field("granted", &self.current().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
