//! Frozen, independently-owned copies of an execution context.

use crate::error::HandlerError;
use crate::event::{Event, Metadata};
use crate::id::SubscriptionId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A value produced by a handler that succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResult {
    /// Subscription that produced the value
    pub subscription_id: SubscriptionId,
    /// Handler name, for diagnostics
    pub handler_name: String,
    /// Priority the handler ran at
    pub priority: i64,
    /// The returned value
    pub value: Value,
}

/// A failure raised by one handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerFailure {
    /// Subscription whose handler failed
    pub subscription_id: SubscriptionId,
    /// Handler name, for diagnostics
    pub handler_name: String,
    /// Priority the handler ran at
    pub priority: i64,
    /// What went wrong
    pub error: HandlerError,
}

/// How an `emit` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A middleware cancelled processing; no handler ran
    Cancelled,
    /// No subscriber existed for the event type
    Unrouted,
    /// Every handler succeeded
    Delivered,
    /// At least one handler failed; the rest still ran
    HandlerFailed,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchOutcome::Cancelled => "cancelled",
            DispatchOutcome::Unrouted => "unrouted",
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::HandlerFailed => "handler_failed",
        };
        f.write_str(name)
    }
}

/// The immutable record of one finished `emit` call.
///
/// A snapshot owns its results, errors and metadata. Cloning it produces a
/// fully independent copy; only the immutable [`Event`] is shared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSnapshot {
    event: Arc<Event>,
    cancelled: bool,
    cancel_reason: Option<String>,
    metadata: Metadata,
    results: Vec<HandlerResult>,
    errors: Vec<HandlerFailure>,
    outcome: DispatchOutcome,
    frozen_at: DateTime<Utc>,
}

impl ExecutionSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        event: Arc<Event>,
        cancelled: bool,
        cancel_reason: Option<String>,
        metadata: Metadata,
        results: Vec<HandlerResult>,
        errors: Vec<HandlerFailure>,
        outcome: DispatchOutcome,
    ) -> Self {
        Self {
            event,
            cancelled,
            cancel_reason,
            metadata,
            results,
            errors,
            outcome,
            frozen_at: Utc::now(),
        }
    }

    /// The event that was dispatched
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Whether a middleware cancelled processing
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Reason given by the cancelling middleware, if any
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Metadata as left by the middleware chain
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Successful handler values, in execution order
    pub fn results(&self) -> &[HandlerResult] {
        &self.results
    }

    /// Handler failures, in execution order
    pub fn errors(&self) -> &[HandlerFailure] {
        &self.errors
    }

    /// How the call ended
    pub fn outcome(&self) -> DispatchOutcome {
        self.outcome
    }

    /// When the context was frozen
    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.frozen_at
    }

    /// Number of handlers that ran, successfully or not
    pub fn handlers_invoked(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    /// Whether any handler failed
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The value a given subscription returned, if it succeeded
    pub fn result_for(&self, id: SubscriptionId) -> Option<&Value> {
        self.results
            .iter()
            .find(|r| r.subscription_id == id)
            .map(|r| &r.value)
    }

    /// The error a given subscription raised, if it failed
    pub fn error_for(&self, id: SubscriptionId) -> Option<&HandlerError> {
        self.errors
            .iter()
            .find(|e| e.subscription_id == id)
            .map(|e| &e.error)
    }
}
