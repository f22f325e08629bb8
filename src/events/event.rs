//! # Runtime events emitted by the runner and its tasks.
//!
//! [`EventKind`] classifies what happened; [`Event`] carries the metadata
//! (timestamp, task name, reason, attempt count). Every caught error in the
//! runtime surfaces as an event, which is how the process logs and survives
//! failures instead of crashing.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Worker lifecycle ===
    /// A worker thread is being started.
    ///
    /// Sets: `task`, `attempt` (1-based start count).
    WorkerStarting,

    /// A worker exited gracefully (shutdown observed, or clean return
    /// during shutdown).
    ///
    /// Sets: `task`.
    WorkerStopped,

    /// A worker exited unexpectedly (error, panic, or early return).
    ///
    /// Sets: `task`, `reason`.
    WorkerFailed,

    /// A failed worker is being resubmitted with its restart flag set.
    ///
    /// Sets: `task`, `attempt` (new start count).
    WorkerRestarted,

    /// A failed worker does not support restarting and was dropped.
    ///
    /// Sets: `task`, `reason`.
    WorkerDropped,

    // === Loop task lifecycle ===
    /// A loop task execution is starting.
    ///
    /// Sets: `task`.
    LoopTaskStarting,

    /// A loop task execution finished cleanly.
    ///
    /// Sets: `task`.
    LoopTaskStopped,

    /// A loop task execution failed; the task resumes on its next
    /// eligible pass.
    ///
    /// Sets: `task`, `reason`.
    LoopTaskFailed,

    /// A loop task was skipped this pass because its previous run still
    /// holds the gate.
    ///
    /// Sets: `task`.
    LoopTaskSkipped,

    /// A loop task's gate was held past its stale timeout; a duplicate
    /// execution is being forced without waiting.
    ///
    /// Sets: `task`, `reason` (seconds since last run).
    LoopTaskForced,

    // === Post-loop cleanup ===
    /// A post-loop task is starting (sequential, registration order).
    ///
    /// Sets: `task`.
    PostTaskStarting,

    /// A post-loop task failed; remaining cleanup still runs.
    ///
    /// Sets: `task`, `reason`.
    PostTaskFailed,

    // === Shutdown ===
    /// Shutdown requested (signal observed or token cancelled).
    ShutdownRequested,

    /// A ping interrupt was observed during the scheduler sleep.
    Ping,

    /// All workers and in-flight tasks stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some tasks did not stop in time.
    GraceExceeded,

    // === Subscriber plumbing ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the worker, loop task, or subscriber, if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (error messages, overflow details).
    pub reason: Option<Arc<str>>,
    /// Start count for workers (1-based).
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates an event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            attempt: None,
        }
    }

    /// Attaches a task or subscriber name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a start count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic() {
        let a = Event::now(EventKind::Ping);
        let b = Event::now(EventKind::Ping);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::WorkerFailed)
            .with_task("poster")
            .with_reason("boom")
            .with_attempt(3);
        assert_eq!(ev.task.as_deref(), Some("poster"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert_eq!(ev.attempt, Some(3));
    }
}
