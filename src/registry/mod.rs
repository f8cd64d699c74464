//! Handler registry mapping event types to priority-ordered subscribers.
//!
//! All mutation and all snapshot reads go through one exclusive lock scoped to
//! the registry. `handlers_for` holds it only long enough to copy the list of
//! `Arc<Subscription>`s, so handlers never run under the lock.

use crate::id::SubscriptionId;
use crate::subscription::{EventHandler, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

mod ordered;
pub use ordered::PriorityList;

#[derive(Debug, Default)]
struct RegistryInner {
    /// Map from event type to its ordered subscribers
    by_type: HashMap<String, PriorityList>,

    /// Map from subscription ID to event type for removal
    subscription_to_type: HashMap<SubscriptionId, String>,

    /// Next registration sequence number
    next_sequence: u64,
}

/// Thread-safe handler registry.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    inner: Mutex<RegistryInner>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type` at `priority`
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        priority: i64,
    ) -> SubscriptionId {
        let event_type = event_type.into();
        let mut inner = self.inner.lock();

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let subscription = Arc::new(Subscription::new(
            event_type.clone(),
            priority,
            sequence,
            handler,
        ));
        let id = subscription.id();

        trace!(
            subscription_id = %id,
            event_type = %event_type,
            priority,
            "Registering subscription"
        );

        inner.subscription_to_type.insert(id, event_type.clone());
        let position = inner
            .by_type
            .entry(event_type)
            .or_default()
            .insert(subscription);

        debug!(subscription_id = %id, position, "Subscription registered");
        id
    }

    /// Remove a subscription.
    ///
    /// Returns `true` if it was registered. Removing an unknown or already
    /// removed id is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();

        let Some(event_type) = inner.subscription_to_type.remove(&id) else {
            trace!(subscription_id = %id, "Unsubscribe of unknown subscription ignored");
            return false;
        };

        if let Some(list) = inner.by_type.get_mut(&event_type) {
            list.remove(id);

            // Don't keep empty lists around for event types nobody listens to
            if list.is_empty() {
                inner.by_type.remove(&event_type);
            }
        }

        debug!(subscription_id = %id, event_type = %event_type, "Subscription removed");
        true
    }

    /// Snapshot of the subscribers for `event_type`, highest priority first
    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        self.inner
            .lock()
            .by_type
            .get(event_type)
            .map(PriorityList::snapshot)
            .unwrap_or_default()
    }

    /// Look up a subscription by id
    pub fn subscription(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let inner = self.inner.lock();
        let event_type = inner.subscription_to_type.get(&id)?;
        inner
            .by_type
            .get(event_type)
            .and_then(|list| list.get(id))
            .cloned()
    }

    /// Number of subscriptions for a specific event type
    pub fn subscription_count(&self, event_type: &str) -> usize {
        self.inner
            .lock()
            .by_type
            .get(event_type)
            .map(PriorityList::len)
            .unwrap_or(0)
    }

    /// Total number of subscriptions across all event types
    pub fn total_subscriptions(&self) -> usize {
        self.inner.lock().subscription_to_type.len()
    }

    /// All event types that currently have subscribers
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.lock().by_type.keys().cloned().collect();
        types.sort();
        types
    }

    /// Current registry statistics
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            event_types: inner.by_type.len(),
            total_subscriptions: inner.subscription_to_type.len(),
        }
    }

    /// Remove every subscription
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_type.clear();
        inner.subscription_to_type.clear();
        debug!("Registry cleared");
    }
}

/// Registry statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of event types with at least one subscriber
    pub event_types: usize,

    /// Total number of subscriptions
    pub total_subscriptions: usize,
}
