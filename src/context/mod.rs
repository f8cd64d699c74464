//! The mutable record of handling one event.
//!
//! An [`ExecutionContext`] is created by the dispatcher for a single `emit`
//! call, threaded by value through the middleware chain, filled in by the
//! handler loop, and finally consumed by [`freeze`](ExecutionContext::freeze)
//! into an [`ExecutionSnapshot`]. Because freezing moves the context, no alias
//! to a live context survives the call.
//!
//! Middleware may write exactly two things: the cancellation flag and the
//! metadata bag. Results, errors and the dispatch state are only writable by
//! the dispatcher.

use crate::dispatcher::DispatchState;
use crate::error::HandlerError;
use crate::event::{Event, Metadata};
use crate::subscription::Subscription;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, trace};

pub mod snapshot;

pub use snapshot::{DispatchOutcome, ExecutionSnapshot, HandlerFailure, HandlerResult};

/// Per-`emit` execution record.
///
/// Not `Clone`, and not constructible outside this crate: a middleware can only
/// hand back the context it was given.
#[derive(Debug)]
pub struct ExecutionContext {
    event: Arc<Event>,
    cancelled: bool,
    cancel_reason: Option<String>,
    metadata: Metadata,
    results: Vec<HandlerResult>,
    errors: Vec<HandlerFailure>,
    state: DispatchState,
    branch: Option<DispatchState>,
}

impl ExecutionContext {
    pub(crate) fn new(event: Arc<Event>) -> Self {
        Self {
            event,
            cancelled: false,
            cancel_reason: None,
            metadata: Metadata::new(),
            results: Vec::new(),
            errors: Vec::new(),
            state: DispatchState::Created,
            branch: None,
        }
    }

    /// The event being handled
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Whether processing has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Cancel processing: no further middleware and no handler will run
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Cancel processing and record why
    pub fn cancel_with_reason(&mut self, reason: impl Into<String>) {
        self.cancelled = true;
        self.cancel_reason = Some(reason.into());
    }

    /// Reason recorded by `cancel_with_reason`
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Metadata bag
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable metadata bag
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Handler results accumulated so far
    pub fn results(&self) -> &[HandlerResult] {
        &self.results
    }

    /// Handler errors accumulated so far
    pub fn errors(&self) -> &[HandlerFailure] {
        &self.errors
    }

    /// Current dispatch state
    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub(crate) fn record_result(&mut self, subscription: &Subscription, value: Value) {
        self.results.push(HandlerResult {
            subscription_id: subscription.id(),
            handler_name: subscription.name().to_string(),
            priority: subscription.priority(),
            value,
        });
    }

    pub(crate) fn record_error(&mut self, subscription: &Subscription, error: HandlerError) {
        self.errors.push(HandlerFailure {
            subscription_id: subscription.id(),
            handler_name: subscription.name().to_string(),
            priority: subscription.priority(),
            error,
        });
    }

    /// Move to `next`, refusing illegal transitions.
    pub(crate) fn advance(&mut self, next: DispatchState) -> bool {
        if !self.state.can_transition_to(next) {
            error!(
                event_id = %self.event.id(),
                from = %self.state,
                to = %next,
                "Invalid dispatch state transition"
            );
            debug_assert!(false, "invalid dispatch transition {} -> {}", self.state, next);
            return false;
        }

        trace!(
            event_id = %self.event.id(),
            from = %self.state,
            to = %next,
            "Dispatch state transition"
        );

        if matches!(
            next,
            DispatchState::Cancelled | DispatchState::NoHandlers | DispatchState::HandlersRunning
        ) {
            self.branch = Some(next);
        }
        self.state = next;
        true
    }

    /// Consume the context into an immutable snapshot.
    pub(crate) fn freeze(mut self) -> ExecutionSnapshot {
        self.advance(DispatchState::Done);

        let outcome = match self.branch {
            Some(DispatchState::Cancelled) => DispatchOutcome::Cancelled,
            Some(DispatchState::HandlersRunning) if self.errors.is_empty() => {
                DispatchOutcome::Delivered
            }
            Some(DispatchState::HandlersRunning) => DispatchOutcome::HandlerFailed,
            _ => DispatchOutcome::Unrouted,
        };

        ExecutionSnapshot::new(
            self.event,
            self.cancelled,
            self.cancel_reason,
            self.metadata,
            self.results,
            self.errors,
            outcome,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::FunctionHandler;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(Event::new("order.paid", json!({ "total": 10 }))))
    }

    fn subscription(name: &str, priority: i64) -> Subscription {
        Subscription::new(
            "order.paid",
            priority,
            0,
            Arc::new(FunctionHandler::with_name(|_| Ok(Value::Null), name)),
        )
    }

    fn run_to_handlers(ctx: &mut ExecutionContext) {
        assert!(ctx.advance(DispatchState::MiddlewareRunning));
        assert!(ctx.advance(DispatchState::MiddlewareComplete));
        assert!(ctx.advance(DispatchState::HandlersRunning));
    }

    #[test]
    fn test_new_context() {
        let ctx = context();
        assert!(!ctx.is_cancelled());
        assert!(ctx.results().is_empty());
        assert!(ctx.errors().is_empty());
        assert_eq!(ctx.state(), DispatchState::Created);
    }

    #[test]
    fn test_cancel_with_reason() {
        let mut ctx = context();
        ctx.cancel_with_reason("rate limited");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some("rate limited"));
    }

    #[test]
    fn test_errors_accumulate_in_order() {
        let mut ctx = context();
        run_to_handlers(&mut ctx);

        let a = subscription("a", 3);
        let b = subscription("b", 2);
        let c = subscription("c", 1);
        ctx.record_error(&a, HandlerError::new("first"));
        ctx.record_result(&b, json!("ok"));
        ctx.record_error(&c, HandlerError::new("second"));

        let messages: Vec<&str> = ctx.errors().iter().map(|f| f.error.message()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(ctx.errors()[1].subscription_id, c.id());
        assert_eq!(ctx.results()[0].handler_name, "b");
    }

    #[test]
    fn test_freeze_outcomes() {
        let mut delivered = context();
        run_to_handlers(&mut delivered);
        delivered.record_result(&subscription("a", 0), json!(1));
        delivered.advance(DispatchState::Finalizing);
        assert_eq!(delivered.freeze().outcome(), DispatchOutcome::Delivered);

        let mut failed = context();
        run_to_handlers(&mut failed);
        failed.record_error(&subscription("a", 0), HandlerError::new("boom"));
        failed.advance(DispatchState::Finalizing);
        assert_eq!(failed.freeze().outcome(), DispatchOutcome::HandlerFailed);

        let mut cancelled = context();
        cancelled.advance(DispatchState::MiddlewareRunning);
        cancelled.cancel();
        cancelled.advance(DispatchState::Cancelled);
        cancelled.advance(DispatchState::Finalizing);
        let snapshot = cancelled.freeze();
        assert_eq!(snapshot.outcome(), DispatchOutcome::Cancelled);
        assert!(snapshot.cancelled());

        let mut unrouted = context();
        unrouted.advance(DispatchState::MiddlewareRunning);
        unrouted.advance(DispatchState::MiddlewareComplete);
        unrouted.advance(DispatchState::NoHandlers);
        unrouted.advance(DispatchState::Finalizing);
        assert_eq!(unrouted.freeze().outcome(), DispatchOutcome::Unrouted);
    }

    #[test]
    fn test_freeze_keeps_metadata_and_event() {
        let mut ctx = context();
        let event_id = ctx.event().id();
        ctx.metadata_mut().set_source("tests");
        ctx.advance(DispatchState::MiddlewareRunning);
        ctx.advance(DispatchState::MiddlewareComplete);
        ctx.advance(DispatchState::NoHandlers);
        ctx.advance(DispatchState::Finalizing);

        let snapshot = ctx.freeze();
        assert_eq!(snapshot.event().id(), event_id);
        assert_eq!(snapshot.metadata().source(), Some("tests"));
    }
}
