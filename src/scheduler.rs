//! Deferred work. The engine never sleeps; it asks a [`Scheduler`] to hand
//! tasks back once their delay has elapsed, so tests drive time explicitly.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::dom::NodeId;
use crate::types::ScrollBehavior;

/// State captured when work is scheduled. A task whose ticket no longer
/// matches the viewer state is stale and must not touch the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub document_id: String,
    pub generation: u64,
    pub reference: Option<String>,
}

/// Work the orchestrator defers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Run the locate/highlight/scroll pass.
    Highlight { behavior: ScrollBehavior, ticket: Ticket },
    /// Notify height listeners after a zoom transform.
    ResizeNotify,
    /// Try the long-form scroll again.
    ScrollRetry {
        attempt: u32,
        behavior: ScrollBehavior,
        target: NodeId,
        ticket: Ticket,
    },
}

/// A source of time plus a queue of delayed tasks.
pub trait Scheduler {
    /// Time elapsed since the scheduler started.
    fn now(&self) -> Duration;

    /// Queue a task to come due after `delay`.
    fn schedule(&mut self, delay: Duration, task: Task);

    /// Remove and return the earliest task whose due time has passed.
    fn pop_due(&mut self) -> Option<Task>;

    /// Number of queued tasks, due or not.
    fn pending(&self) -> usize;
}

/// Deterministic scheduler on a virtual clock. Tasks due at the same instant
/// come back in scheduling order.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    /// Virtual time.
    clock: Duration,
    /// Tasks keyed by due time, then scheduling order.
    queue: BTreeMap<(Duration, u64), Task>,
    /// Next scheduling sequence number.
    sequence: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Move the clock forward.
    pub fn advance(&mut self, by: Duration) {
        self.clock = self.clock.saturating_add(by);
    }

    /// Jump the clock to the next due task. Returns `false` when idle.
    pub fn advance_to_next(&mut self) -> bool {
        let Some((due, _)) = self.queue.keys().next().copied() else {
            return false;
        };
        self.clock = self.clock.max(due);
        return true;
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        return self.clock;
    }

    fn schedule(&mut self, delay: Duration, task: Task) {
        let due = self.clock.saturating_add(delay);
        self.queue.insert((due, self.sequence), task);
        self.sequence = self.sequence.saturating_add(1);
    }

    fn pop_due(&mut self) -> Option<Task> {
        let key = *self.queue.keys().next()?;
        if key.0 > self.clock {
            return None;
        }
        return self.queue.remove(&key);
    }

    fn pending(&self) -> usize {
        return self.queue.len();
    }
}
