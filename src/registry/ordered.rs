//! Priority-ordered subscription list.

use crate::id::SubscriptionId;
use crate::subscription::Subscription;
use std::sync::Arc;

/// Subscriptions for one event type, kept sorted by priority (descending).
///
/// Insertion finds its slot with a binary search, so the list is never
/// re-sorted. Equal priorities keep registration order: a newcomer lands after
/// every entry whose priority is greater than or equal to its own.
#[derive(Debug, Default, Clone)]
pub struct PriorityList {
    entries: Vec<Arc<Subscription>>,
}

impl PriorityList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription at its ordered position, returning that position
    pub fn insert(&mut self, subscription: Arc<Subscription>) -> usize {
        let priority = subscription.priority();
        let position = self
            .entries
            .partition_point(|existing| existing.priority() >= priority);
        self.entries.insert(position, subscription);
        position
    }

    /// Remove a subscription by id
    pub fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let position = self.entries.iter().position(|s| s.id() == id)?;
        Some(self.entries.remove(position))
    }

    /// Find a subscription by id
    pub fn get(&self, id: SubscriptionId) -> Option<&Arc<Subscription>> {
        self.entries.iter().find(|s| s.id() == id)
    }

    /// Copy the current order
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.entries.clone()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
