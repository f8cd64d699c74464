//! Event dispatcher: runs middleware, routes to handlers, records failures.
//!
//! One `emit` call runs entirely on the calling thread:
//!
//! 1. the event and its execution context are created;
//! 2. the middleware chain runs, and may cancel or break its contract;
//! 3. the registry is snapshotted for the event type;
//! 4. each handler runs in priority order, isolated from the others;
//! 5. the context is frozen and, if nothing was routed or any handler failed,
//!    a copy of the snapshot is dead-lettered.
//!
//! Handlers never run while a lock is held.

use crate::bus::EventBusConfig;
use crate::context::{ExecutionContext, ExecutionSnapshot};
use crate::dead_letter::{DeadLetterCategory, DeadLetterEntry, DeadLetterSink};
use crate::error::{HandlerError, HandlerErrorKind, Result};
use crate::event::Event;
use crate::id::SubscriptionId;
use crate::middleware::MiddlewareChain;
use crate::registry::HandlerRegistry;
use crate::subscription::{EventHandler, Subscription};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, error, trace};

pub mod state;

pub use state::DispatchState;

#[derive(Debug, Default)]
struct Counters {
    events_emitted: AtomicU64,
    events_cancelled: AtomicU64,
    events_unrouted: AtomicU64,
    events_delivered: AtomicU64,
    events_failed: AtomicU64,
    handlers_invoked: AtomicU64,
    handler_failures: AtomicU64,
    contract_violations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Synchronous event dispatcher.
///
/// Owns the handler registry, the middleware chain and the dead-letter sink.
/// It is `Send + Sync`; any number of threads may emit and subscribe at once.
pub struct Dispatcher {
    registry: HandlerRegistry,
    middleware: MiddlewareChain,
    dead_letters: DeadLetterSink,
    capture_panics: bool,
    counters: Counters,
}

impl Dispatcher {
    /// Create a dispatcher from a validated configuration and a finished
    /// middleware chain
    pub fn new(config: &EventBusConfig, middleware: MiddlewareChain) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            registry: HandlerRegistry::new(),
            middleware,
            dead_letters: DeadLetterSink::new(config.dead_letter_capacity)?,
            capture_panics: config.capture_handler_panics,
            counters: Counters::default(),
        })
    }

    /// Emit an event and run it to completion.
    ///
    /// Returns the frozen snapshot of the call. Handler failures are data in
    /// the snapshot; only a middleware contract violation is an `Err`.
    pub fn emit(&self, event_type: impl Into<String>, payload: Value) -> Result<ExecutionSnapshot> {
        let event = Arc::new(Event::new(event_type, payload));

        let span = debug_span!(
            "emit",
            event_id = %event.id(),
            event_type = %event.event_type()
        );
        let _enter = span.enter();

        Counters::bump(&self.counters.events_emitted);
        self.dispatch(event)
    }

    fn dispatch(&self, event: Arc<Event>) -> Result<ExecutionSnapshot> {
        let mut ctx = ExecutionContext::new(Arc::clone(&event));
        ctx.advance(DispatchState::MiddlewareRunning);

        let mut ctx = match self.middleware.run(ctx) {
            Ok(ctx) => ctx,
            Err(e) => {
                Counters::bump(&self.counters.contract_violations);
                return Err(e);
            }
        };

        if ctx.is_cancelled() {
            debug!(
                reason = ctx.cancel_reason().unwrap_or("none"),
                "Event cancelled by middleware"
            );
            ctx.advance(DispatchState::Cancelled);
            ctx.advance(DispatchState::Finalizing);
            Counters::bump(&self.counters.events_cancelled);
            return Ok(ctx.freeze());
        }

        ctx.advance(DispatchState::MiddlewareComplete);

        let subscriptions = self.registry.handlers_for(event.event_type());
        if subscriptions.is_empty() {
            ctx.advance(DispatchState::NoHandlers);
            ctx.advance(DispatchState::Finalizing);
            let snapshot = ctx.freeze();

            Counters::bump(&self.counters.events_unrouted);
            self.dead_letters.record(DeadLetterEntry::new(
                DeadLetterCategory::Unrouted,
                snapshot.clone(),
            ));
            return Ok(snapshot);
        }

        ctx.advance(DispatchState::HandlersRunning);

        for subscription in &subscriptions {
            trace!(
                subscription_id = %subscription.id(),
                handler = subscription.name(),
                priority = subscription.priority(),
                "Invoking handler"
            );
            Counters::bump(&self.counters.handlers_invoked);

            match self.invoke(subscription, &event) {
                Ok(value) => ctx.record_result(subscription, value),
                Err(err) => {
                    error!(
                        subscription_id = %subscription.id(),
                        handler = subscription.name(),
                        error = %err,
                        "Handler failed"
                    );
                    Counters::bump(&self.counters.handler_failures);
                    ctx.record_error(subscription, err);
                }
            }
        }

        ctx.advance(DispatchState::Finalizing);
        let snapshot = ctx.freeze();

        if snapshot.has_errors() {
            Counters::bump(&self.counters.events_failed);
            self.dead_letters.record(DeadLetterEntry::new(
                DeadLetterCategory::HandlerFailed,
                snapshot.clone(),
            ));
        } else {
            Counters::bump(&self.counters.events_delivered);
        }

        Ok(snapshot)
    }

    fn invoke(
        &self,
        subscription: &Subscription,
        event: &Event,
    ) -> std::result::Result<Value, HandlerError> {
        if !self.capture_panics {
            return subscription.invoke(event);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| subscription.invoke(event))) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::with_kind(
                HandlerErrorKind::Panicked,
                panic_message(payload.as_ref()),
            )),
        }
    }

    /// Register `handler` for `event_type` at `priority`
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        priority: i64,
    ) -> SubscriptionId {
        self.registry.subscribe(event_type, handler, priority)
    }

    /// Remove a subscription; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Snapshot of the subscribers for `event_type`, in execution order
    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        self.registry.handlers_for(event_type)
    }

    /// The handler registry
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The middleware chain
    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// The dead-letter sink
    pub fn dead_letters(&self) -> &DeadLetterSink {
        &self.dead_letters
    }

    /// Whether handler panics are captured as failures
    pub fn captures_panics(&self) -> bool {
        self.capture_panics
    }

    /// Current dispatch counters
    pub fn stats(&self) -> DispatcherStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DispatcherStats {
            events_emitted: load(&self.counters.events_emitted),
            events_cancelled: load(&self.counters.events_cancelled),
            events_unrouted: load(&self.counters.events_unrouted),
            events_delivered: load(&self.counters.events_delivered),
            events_failed: load(&self.counters.events_failed),
            handlers_invoked: load(&self.counters.handlers_invoked),
            handler_failures: load(&self.counters.handler_failures),
            contract_violations: load(&self.counters.contract_violations),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry.stats())
            .field("middleware", &self.middleware)
            .field("dead_letters", &self.dead_letters.len())
            .field("capture_panics", &self.capture_panics)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

/// Statistics for the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Total `emit` calls
    pub events_emitted: u64,
    /// Events a middleware cancelled
    pub events_cancelled: u64,
    /// Events with no subscriber
    pub events_unrouted: u64,
    /// Events where every handler succeeded
    pub events_delivered: u64,
    /// Events where at least one handler failed
    pub events_failed: u64,
    /// Handler invocations
    pub handlers_invoked: u64,
    /// Handler invocations that failed
    pub handler_failures: u64,
    /// `emit` calls aborted by a middleware contract violation
    pub contract_violations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DispatchOutcome;
    use crate::error::{ContractBreach, Error};
    use crate::middleware::FnMiddleware;
    use crate::subscription::FunctionHandler;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&EventBusConfig::test(), MiddlewareChain::new()).unwrap()
    }

    fn with_middleware(chain: MiddlewareChain) -> Dispatcher {
        Dispatcher::new(&EventBusConfig::test(), chain).unwrap()
    }

    fn ok_handler(name: &str, value: Value) -> Arc<dyn EventHandler> {
        Arc::new(FunctionHandler::with_name(
            move |_: &Event| Ok(value.clone()),
            name,
        ))
    }

    fn failing_handler(name: &str, message: &'static str) -> Arc<dyn EventHandler> {
        Arc::new(FunctionHandler::with_name(
            move |_: &Event| Err(HandlerError::new(message)),
            name,
        ))
    }

    #[test]
    fn test_order_paid_scenario() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(FnMiddleware::with_name(
            |mut ctx: ExecutionContext| {
                ctx.metadata_mut().set_source("checkout");
                Some(ctx)
            },
            "tagger",
        ));
        let dispatcher = with_middleware(chain);

        let email = dispatcher.subscribe("order.paid", ok_handler("email", json!("sent")), 10);
        let ledger = dispatcher.subscribe(
            "order.paid",
            failing_handler("ledger", "ledger offline"),
            5,
        );
        let analytics =
            dispatcher.subscribe("order.paid", ok_handler("analytics", json!(1)), 0);

        let snapshot = dispatcher
            .emit("order.paid", json!({ "order_id": 42 }))
            .unwrap();

        assert_eq!(snapshot.outcome(), DispatchOutcome::HandlerFailed);
        assert_eq!(snapshot.metadata().source(), Some("checkout"));
        assert_eq!(snapshot.handlers_invoked(), 3);
        assert_eq!(snapshot.result_for(email), Some(&json!("sent")));
        assert_eq!(snapshot.result_for(analytics), Some(&json!(1)));
        assert_eq!(
            snapshot.error_for(ledger).map(|e| e.message()),
            Some("ledger offline")
        );

        let letters = dispatcher.dead_letters().drain(10);
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].category(), DeadLetterCategory::HandlerFailed);
        assert_eq!(letters[0].snapshot(), &snapshot);
    }

    #[test]
    fn test_every_failure_is_recorded() {
        let dispatcher = dispatcher();
        for i in 0..4 {
            dispatcher.subscribe("job", failing_handler(&format!("h{}", i), "down"), i);
        }
        dispatcher.subscribe("job", ok_handler("fine", json!(true)), -1);

        let snapshot = dispatcher.emit("job", Value::Null).unwrap();
        assert_eq!(snapshot.errors().len(), 4);
        assert_eq!(snapshot.results().len(), 1);

        let names: Vec<&str> = snapshot
            .errors()
            .iter()
            .map(|f| f.handler_name.as_str())
            .collect();
        assert_eq!(names, vec!["h3", "h2", "h1", "h0"]);

        let stats = dispatcher.stats();
        assert_eq!(stats.handler_failures, 4);
        assert_eq!(stats.handlers_invoked, 5);
        assert_eq!(stats.events_failed, 1);
    }

    #[test]
    fn test_unrouted_event_is_dead_lettered() {
        let dispatcher = dispatcher();
        let snapshot = dispatcher.emit("nobody.listens", json!({})).unwrap();

        assert_eq!(snapshot.outcome(), DispatchOutcome::Unrouted);
        assert_eq!(snapshot.handlers_invoked(), 0);

        let letters = dispatcher.dead_letters().drain_all();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].category(), DeadLetterCategory::Unrouted);
        assert_eq!(letters[0].snapshot().event().id(), snapshot.event().id());
        assert_eq!(dispatcher.stats().events_unrouted, 1);
    }

    #[test]
    fn test_cancelled_event_runs_nothing_and_is_not_dead_lettered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let mut chain = MiddlewareChain::new();
        chain.use_fn(|mut ctx| {
            ctx.cancel_with_reason("maintenance");
            Some(ctx)
        });
        let dispatcher = with_middleware(chain);
        dispatcher.subscribe(
            "order.paid",
            Arc::new(FunctionHandler::new(move |_: &Event| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })),
            0,
        );

        let snapshot = dispatcher.emit("order.paid", json!({})).unwrap();
        assert_eq!(snapshot.outcome(), DispatchOutcome::Cancelled);
        assert_eq!(snapshot.cancel_reason(), Some("maintenance"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.dead_letters().is_empty());
        assert_eq!(dispatcher.stats().events_cancelled, 1);
    }

    #[test]
    fn test_cancelled_unrouted_event_is_not_dead_lettered() {
        let mut chain = MiddlewareChain::new();
        chain.use_fn(|mut ctx| {
            ctx.cancel();
            Some(ctx)
        });
        let dispatcher = with_middleware(chain);

        let snapshot = dispatcher.emit("nobody.listens", json!({})).unwrap();
        assert_eq!(snapshot.outcome(), DispatchOutcome::Cancelled);
        assert!(dispatcher.dead_letters().is_empty());
        assert_eq!(dispatcher.stats().events_unrouted, 0);
    }

    #[test]
    fn test_contract_violation_runs_no_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let mut chain = MiddlewareChain::new();
        chain.use_middleware(FnMiddleware::with_name(|_ctx| None, "broken"));
        let dispatcher = with_middleware(chain);
        dispatcher.subscribe(
            "order.paid",
            Arc::new(FunctionHandler::new(move |_: &Event| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })),
            0,
        );

        let err = dispatcher.emit("order.paid", json!({})).unwrap_err();
        assert_eq!(
            err,
            Error::contract_violation("broken", 0, ContractBreach::MissingContext)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.dead_letters().is_empty());
        assert_eq!(dispatcher.stats().contract_violations, 1);
    }

    #[test]
    fn test_handler_panic_is_isolated() {
        let dispatcher = dispatcher();
        dispatcher.subscribe(
            "risky",
            Arc::new(FunctionHandler::with_name(
                |_: &Event| -> std::result::Result<Value, HandlerError> {
                    panic!("index out of range")
                },
                "panicky",
            )),
            1,
        );
        dispatcher.subscribe("risky", ok_handler("after", json!("still ran")), 0);

        let snapshot = dispatcher.emit("risky", Value::Null).unwrap();
        assert_eq!(snapshot.errors().len(), 1);
        let failure = &snapshot.errors()[0];
        assert!(failure.error.is_panic());
        assert_eq!(failure.error.message(), "index out of range");
        assert_eq!(snapshot.results()[0].value, json!("still ran"));
    }

    #[test]
    fn test_handlers_run_in_priority_order() {
        let dispatcher = dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for (label, priority) in [("3a", 3), ("1", 1), ("3b", 3), ("2", 2)] {
            let seen = seen.clone();
            dispatcher.subscribe(
                "ordered",
                Arc::new(FunctionHandler::with_name(
                    move |_: &Event| {
                        seen.lock().push(label);
                        Ok(Value::Null)
                    },
                    label,
                )),
                priority,
            );
        }

        dispatcher.emit("ordered", Value::Null).unwrap();
        assert_eq!(*seen.lock(), vec!["3a", "3b", "2", "1"]);
    }

    #[test]
    fn test_dead_letter_holds_its_own_copy() {
        let dispatcher = dispatcher();
        dispatcher.subscribe("job", ok_handler("ok", json!(1)), 1);
        dispatcher.subscribe("job", failing_handler("bad", "nope"), 0);

        let snapshot = dispatcher.emit("job", Value::Null).unwrap();
        let letter = dispatcher.dead_letters().drain(1).remove(0);

        assert_eq!(letter.snapshot(), &snapshot);
        assert_ne!(
            letter.snapshot().results().as_ptr(),
            snapshot.results().as_ptr()
        );
        assert_ne!(
            letter.snapshot().errors().as_ptr(),
            snapshot.errors().as_ptr()
        );

        // Dropping the caller's copy leaves the dead letter intact
        drop(snapshot);
        assert_eq!(letter.snapshot().errors()[0].error.message(), "nope");
    }

    #[test]
    fn test_unsubscribed_handler_no_longer_runs() {
        let dispatcher = dispatcher();
        let id = dispatcher.subscribe("job", ok_handler("gone", json!(1)), 0);
        assert!(dispatcher.unsubscribe(id));

        let snapshot = dispatcher.emit("job", Value::Null).unwrap();
        assert_eq!(snapshot.outcome(), DispatchOutcome::Unrouted);
    }

    #[test]
    fn test_delivered_event_is_not_dead_lettered() {
        let dispatcher = dispatcher();
        dispatcher.subscribe("job", ok_handler("ok", json!(1)), 0);

        let snapshot = dispatcher.emit("job", Value::Null).unwrap();
        assert_eq!(snapshot.outcome(), DispatchOutcome::Delivered);
        assert!(dispatcher.dead_letters().is_empty());
        assert_eq!(dispatcher.stats().events_delivered, 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(
            panic_message(&42u32),
            "handler panicked with a non-string payload"
        );
    }
}
