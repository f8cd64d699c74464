//! Per-`emit` dispatch state machine.

use std::fmt;

/// The stage one `emit` call has reached.
///
/// ```text
/// Created → MiddlewareRunning → Cancelled ──────────────────────────┐
///                             └→ MiddlewareComplete → NoHandlers ───┤
///                                                  └→ HandlersRunning┤
///                                                                    └→ Finalizing → Done
/// ```
///
/// Transitions are strictly forward; there is no way back into an earlier
/// stage of the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// Event and context constructed
    Created,
    /// Middleware chain executing
    MiddlewareRunning,
    /// A middleware cancelled processing
    Cancelled,
    /// Every middleware ran without cancelling
    MiddlewareComplete,
    /// The registry had no subscriber for the event type
    NoHandlers,
    /// Handlers executing in priority order
    HandlersRunning,
    /// Dead-letter routing and freezing
    Finalizing,
    /// Snapshot produced; the context is gone
    Done,
}

impl DispatchState {
    /// Check whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;

        matches!(
            (self, next),
            (Created, MiddlewareRunning)
                | (MiddlewareRunning, Cancelled)
                | (MiddlewareRunning, MiddlewareComplete)
                | (MiddlewareComplete, NoHandlers)
                | (MiddlewareComplete, HandlersRunning)
                | (Cancelled, Finalizing)
                | (NoHandlers, Finalizing)
                | (HandlersRunning, Finalizing)
                | (Finalizing, Done)
        )
    }

    /// Whether the state is terminal
    pub fn is_terminal(self) -> bool {
        self == DispatchState::Done
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Created => "created",
            DispatchState::MiddlewareRunning => "middleware_running",
            DispatchState::Cancelled => "cancelled",
            DispatchState::MiddlewareComplete => "middleware_complete",
            DispatchState::NoHandlers => "no_handlers",
            DispatchState::HandlersRunning => "handlers_running",
            DispatchState::Finalizing => "finalizing",
            DispatchState::Done => "done",
        };
        f.write_str(name)
    }
}
