//! # Loop task scheduling state.
//!
//! A [`LoopEntry`] pairs a registered [`Task`] with its scheduling knobs:
//!
//! - `sleep`: optional post-run hold. `Some(d)` makes the task mutually
//!   exclusive with its own prior run, holding the gate through an
//!   interruptible sleep of `d` after each execution; zero releases
//!   immediately but still enforces one attempt per pass. `None` disables
//!   serialization entirely; the task runs every pass regardless.
//! - `stale_after`: how long a held gate is trusted. Once `now - last_run`
//!   exceeds it, the holder is presumed hung and the next pass forces a
//!   duplicate execution without waiting.
//!
//! ## Gate protocol
//! ```text
//! pass:  try_begin() ── ok ──► run ──► hold sleep ──► end()
//!          │
//!          └─ held ──► stale? ── no ──► skip this pass
//!                        │
//!                        yes ─► force_begin() ──► duplicate run ──► end()
//! ```
//!
//! `try_begin` and `force_begin` both stamp `last_run` synchronously inside
//! the scheduling pass, so a forced duplicate cannot itself be considered
//! stale until a full `stale_after` has elapsed again: at most one forced
//! duplicate is live at a time. The abandoned holder is never interrupted;
//! if it later resumes, the relative ordering of the two executions'
//! effects is unspecified.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::runtime::task::TaskRef;

/// Default stale timeout for loop-task gates.
pub const STALE_AFTER: Duration = Duration::from_secs(120);

/// One registered loop task plus its serialization gate.
pub(crate) struct LoopEntry {
    pub(crate) task: TaskRef,
    pub(crate) sleep: Option<Duration>,
    stale_after: Duration,
    busy: AtomicBool,
    last_run: Mutex<Option<Instant>>,
}

impl LoopEntry {
    pub(crate) fn new(task: TaskRef, sleep: Option<Duration>, stale_after: Duration) -> Self {
        Self {
            task,
            sleep,
            stale_after,
            busy: AtomicBool::new(false),
            last_run: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.task.name()
    }

    /// Whether this task serializes with its own prior run at all.
    pub(crate) fn gated(&self) -> bool {
        self.sleep.is_some()
    }

    /// Non-blocking gate acquisition. On success, stamps `last_run`.
    pub(crate) fn try_begin(&self, now: Instant) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.stamp(now);
            true
        } else {
            false
        }
    }

    /// True when the gate is held and the holder has been silent past the
    /// stale timeout.
    pub(crate) fn stale(&self, now: Instant) -> bool {
        if !self.busy.load(Ordering::Acquire) {
            return false;
        }
        self.lock_last_run()
            .map(|last| now.saturating_duration_since(last) > self.stale_after)
            .unwrap_or(false)
    }

    /// Claims a forced duplicate execution of a stale gate: re-stamps
    /// `last_run` so no further force fires for another `stale_after`.
    pub(crate) fn force_begin(&self, now: Instant) -> Duration {
        let since = self
            .lock_last_run()
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.stamp(now);
        since
    }

    /// Releases the gate. Idempotent: the abandoned holder of a forced
    /// gate releases it again harmlessly when it eventually finishes.
    pub(crate) fn end(&self) {
        self.busy.store(false, Ordering::Release);
    }

    fn stamp(&self, now: Instant) {
        *self
            .last_run
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(now);
    }

    fn lock_last_run(&self) -> Option<Instant> {
        *self.last_run.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::runtime::ShutdownSignal;
    use crate::runtime::task::TaskFn;

    fn entry(sleep: Option<Duration>, stale_after: Duration) -> LoopEntry {
        let task = TaskFn::arc("t", |_signal: ShutdownSignal| async {
            Ok::<_, TaskError>(())
        });
        LoopEntry::new(task, sleep, stale_after)
    }

    #[test]
    fn gate_is_exclusive_until_released() {
        let e = entry(Some(Duration::ZERO), STALE_AFTER);
        let now = Instant::now();

        assert!(e.try_begin(now));
        assert!(!e.try_begin(now));
        e.end();
        assert!(e.try_begin(now));
    }

    #[test]
    fn fresh_gate_is_never_stale() {
        let e = entry(Some(Duration::ZERO), Duration::from_secs(120));
        let now = Instant::now();

        assert!(!e.stale(now));
        assert!(e.try_begin(now));
        assert!(!e.stale(now + Duration::from_secs(119)));
    }

    #[test]
    fn held_gate_becomes_stale_past_timeout() {
        let e = entry(Some(Duration::ZERO), Duration::from_secs(120));
        let start = Instant::now();

        assert!(e.try_begin(start));
        let later = start + Duration::from_secs(121);
        assert!(e.stale(later));

        // Forcing re-stamps: no second force until another timeout passes.
        let since = e.force_begin(later);
        assert!(since >= Duration::from_secs(121));
        assert!(!e.stale(later + Duration::from_secs(1)));
        assert!(e.stale(later + Duration::from_secs(121)));
    }

    #[test]
    fn released_gate_is_not_stale() {
        let e = entry(Some(Duration::ZERO), Duration::from_secs(120));
        let start = Instant::now();

        assert!(e.try_begin(start));
        e.end();
        assert!(!e.stale(start + Duration::from_secs(300)));
    }

    #[test]
    fn ungated_entry_reports_no_serialization() {
        let e = entry(None, STALE_AFTER);
        assert!(!e.gated());
    }
}
