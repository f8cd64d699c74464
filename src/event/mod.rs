//! Core event type.
//!
//! An [`Event`] is an immutable fact: a type tag and a payload, stamped with a
//! unique id and the time it was emitted. One is created per `emit` call and
//! shared by reference (`Arc<Event>`) with every handler and with the
//! resulting snapshot. Nothing ever mutates it.

use crate::id::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod metadata;

pub use metadata::Metadata;

/// An emitted event.
///
/// There are no mutating accessors; the payload can only be borrowed.
///
/// # Example
///
/// ```rust
/// use fault_isolated_events::Event;
/// use serde_json::json;
///
/// let event = Event::new("order.paid", json!({ "order_id": 7 }));
/// assert_eq!(event.event_type(), "order.paid");
/// assert_eq!(event.payload()["order_id"], 7);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: String,
    payload: Value,
    occurred_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event with a fresh id and the current timestamp
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// Unique id of this emission
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The type tag handlers subscribe to
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The opaque payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// When the event was emitted
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
