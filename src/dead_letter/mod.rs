//! Bounded dead-letter sink.
//!
//! Events that reached no handler, and events where at least one handler
//! failed, are recorded here as frozen snapshots. The sink is a fixed-size ring
//! buffer: once full, recording a new entry evicts the oldest one.

use crate::context::ExecutionSnapshot;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Slots reserved up front; the buffer grows on demand up to its capacity.
const INITIAL_SLOTS: usize = 64;

/// Why an event was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterCategory {
    /// No handler was subscribed to the event type
    Unrouted,
    /// At least one handler failed
    HandlerFailed,
}

impl fmt::Display for DeadLetterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadLetterCategory::Unrouted => f.write_str("unrouted"),
            DeadLetterCategory::HandlerFailed => f.write_str("handler_failed"),
        }
    }
}

/// A recorded dead letter.
///
/// The snapshot is owned by the entry; it is never the same allocation as the
/// snapshot handed back to the `emit` caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterEntry {
    category: DeadLetterCategory,
    snapshot: ExecutionSnapshot,
    recorded_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Create an entry stamped with the current time
    pub fn new(category: DeadLetterCategory, snapshot: ExecutionSnapshot) -> Self {
        Self {
            category,
            snapshot,
            recorded_at: Utc::now(),
        }
    }

    /// Why the event was dead-lettered
    pub fn category(&self) -> DeadLetterCategory {
        self.category
    }

    /// The frozen execution record
    pub fn snapshot(&self) -> &ExecutionSnapshot {
        &self.snapshot
    }

    /// Take ownership of the snapshot
    pub fn into_snapshot(self) -> ExecutionSnapshot {
        self.snapshot
    }

    /// When the entry was recorded
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Fixed-capacity, oldest-first-evicting store of dead letters.
#[derive(Debug)]
pub struct DeadLetterSink {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    capacity: usize,
    recorded: AtomicU64,
    evicted: AtomicU64,
    drained: AtomicU64,
    unrouted: AtomicU64,
    handler_failed: AtomicU64,
}

impl DeadLetterSink {
    /// Create a sink holding at most `capacity` entries.
    ///
    /// A capacity of zero is rejected.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config(
                "dead letter capacity must be greater than zero",
            ));
        }

        Ok(Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(INITIAL_SLOTS))),
            capacity,
            recorded: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            unrouted: AtomicU64::new(0),
            handler_failed: AtomicU64::new(0),
        })
    }

    /// Record an entry, returning the evicted oldest entry if the sink was full
    pub fn record(&self, entry: DeadLetterEntry) -> Option<DeadLetterEntry> {
        let category = entry.category();
        let event_id = entry.snapshot().event().id();

        let evicted = {
            let mut entries = self.entries.lock();
            let evicted = if entries.len() >= self.capacity {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(entry);
            evicted
        };

        self.recorded.fetch_add(1, Ordering::Relaxed);
        match category {
            DeadLetterCategory::Unrouted => self.unrouted.fetch_add(1, Ordering::Relaxed),
            DeadLetterCategory::HandlerFailed => {
                self.handler_failed.fetch_add(1, Ordering::Relaxed)
            }
        };

        warn!(event_id = %event_id, category = %category, "Event dead-lettered");

        if let Some(old) = &evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                evicted_event_id = %old.snapshot().event().id(),
                capacity = self.capacity,
                "Dead letter sink full, oldest entry evicted"
            );
        }

        evicted
    }

    /// Remove up to `max_n` entries, oldest first
    pub fn drain(&self, max_n: usize) -> Vec<DeadLetterEntry> {
        let drained: Vec<DeadLetterEntry> = {
            let mut entries = self.entries.lock();
            let n = max_n.min(entries.len());
            entries.drain(..n).collect()
        };

        if !drained.is_empty() {
            self.drained
                .fetch_add(drained.len() as u64, Ordering::Relaxed);
            debug!(count = drained.len(), "Dead letters drained");
        }
        drained
    }

    /// Remove every entry, oldest first
    pub fn drain_all(&self) -> Vec<DeadLetterEntry> {
        self.drain(usize::MAX)
    }

    /// Copy up to `max_n` entries without removing them
    pub fn peek(&self, max_n: usize) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().take(max_n).cloned().collect()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the sink is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of entries held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current sink statistics
    pub fn stats(&self) -> DeadLetterStats {
        DeadLetterStats {
            held: self.len(),
            recorded: self.recorded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            handler_failed: self.handler_failed.load(Ordering::Relaxed),
        }
    }
}

/// Dead-letter sink statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadLetterStats {
    /// Entries currently held
    pub held: usize,
    /// Entries recorded since creation
    pub recorded: u64,
    /// Entries dropped because the sink was full
    pub evicted: u64,
    /// Entries removed by `drain`
    pub drained: u64,
    /// Recorded entries in the `Unrouted` category
    pub unrouted: u64,
    /// Recorded entries in the `HandlerFailed` category
    pub handler_failed: u64,
}
