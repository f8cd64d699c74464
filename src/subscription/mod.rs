//! Subscriptions: a handler bound to an event type at a priority.
//!
//! A [`Subscription`] is created by `subscribe`, lives in the registry until
//! `unsubscribe` removes it, and is handed out to the dispatcher as an
//! `Arc<Subscription>` inside registry snapshots. It is immutable once built,
//! so a snapshot taken before an unsubscribe keeps a valid handler.

use crate::error::HandlerError;
use crate::event::Event;
use crate::id::SubscriptionId;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod handler;

pub use handler::{EventHandler, FunctionHandler, TypedHandler};

/// A registered handler.
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
    priority: i64,
    sequence: u64,
    name: String,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    pub(crate) fn new(
        event_type: impl Into<String>,
        priority: i64,
        sequence: u64,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            event_type: event_type.into(),
            priority,
            sequence,
            name: handler.name().to_string(),
            handler,
        }
    }

    /// Unique ID for this subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event type this subscription listens to
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Priority; higher runs first
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Registration sequence number, used to break priority ties
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Handler name for debugging
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the handler against an event
    pub fn invoke(&self, event: &Event) -> Result<Value, HandlerError> {
        self.handler.handle(event)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription '{}' ({}) on {} @ {}",
            self.name, self.id, self.event_type, self.priority
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_takes_handler_name() {
        let handler = FunctionHandler::with_name(|_: &Event| Ok(json!(1)), "ledger");
        let sub = Subscription::new("order.paid", 5, 0, Arc::new(handler));

        assert_eq!(sub.name(), "ledger");
        assert_eq!(sub.event_type(), "order.paid");
        assert_eq!(sub.priority(), 5);
        assert_eq!(
            sub.to_string(),
            format!("Subscription 'ledger' ({}) on order.paid @ 5", sub.id())
        );
    }

    #[test]
    fn test_invoke_runs_handler() {
        let sub = Subscription::new(
            "double",
            0,
            0,
            Arc::new(FunctionHandler::new(|event: &Event| {
                let n = event.payload().as_i64().unwrap_or_default();
                Ok(json!(n * 2))
            })),
        );

        let value = sub.invoke(&Event::new("double", json!(21))).unwrap();
        assert_eq!(value, json!(42));
    }
}
