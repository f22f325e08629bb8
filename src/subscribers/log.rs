//! # LogWriter: simple event printer.
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout. This is
//! the default log sink of the runtime; swap in your own [`Subscribe`]
//! implementation for structured sinks.
//!
//! ## Example output
//! ```text
//! [worker-starting] task="poster" attempt=1
//! [worker-failed] task="poster" reason="connection refused"
//! [worker-restarted] task="poster" attempt=2
//! [loop-starting] task="mentions"
//! [loop-skipped] task="mentions"
//! [loop-forced] task="mentions" reason="last run 132s ago"
//! [shutdown-requested]
//! [all-stopped-within-grace]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn field(opt: &Option<std::sync::Arc<str>>) -> &str {
        opt.as_deref().unwrap_or("?")
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::WorkerStarting => {
                println!(
                    "[worker-starting] task={:?} attempt={}",
                    Self::field(&e.task),
                    e.attempt.unwrap_or(1)
                );
            }
            EventKind::WorkerStopped => {
                println!("[worker-stopped] task={:?}", Self::field(&e.task));
            }
            EventKind::WorkerFailed => {
                println!(
                    "[worker-failed] task={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
            EventKind::WorkerRestarted => {
                println!(
                    "[worker-restarted] task={:?} attempt={}",
                    Self::field(&e.task),
                    e.attempt.unwrap_or(0)
                );
            }
            EventKind::WorkerDropped => {
                println!(
                    "[worker-dropped] task={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
            EventKind::LoopTaskStarting => {
                println!("[loop-starting] task={:?}", Self::field(&e.task));
            }
            EventKind::LoopTaskStopped => {
                println!("[loop-stopped] task={:?}", Self::field(&e.task));
            }
            EventKind::LoopTaskFailed => {
                println!(
                    "[loop-failed] task={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
            EventKind::LoopTaskSkipped => {
                println!("[loop-skipped] task={:?}", Self::field(&e.task));
            }
            EventKind::LoopTaskForced => {
                println!(
                    "[loop-forced] task={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
            EventKind::PostTaskStarting => {
                println!("[post-starting] task={:?}", Self::field(&e.task));
            }
            EventKind::PostTaskFailed => {
                println!(
                    "[post-failed] task={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::Ping => {
                println!("[pong]");
            }
            EventKind::AllStoppedWithin => {
                println!("[all-stopped-within-grace]");
            }
            EventKind::GraceExceeded => {
                println!("[grace-exceeded]");
            }
            EventKind::SubscriberOverflow => {
                println!(
                    "[subscriber-overflow] subscriber={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={:?} reason={:?}",
                    Self::field(&e.task),
                    Self::field(&e.reason)
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
