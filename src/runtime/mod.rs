//! Runtime core: task supervision and cooperative shutdown.
//!
//! ## Contents
//! - [`Runner`] — the control loop supervising all registered work
//! - [`RunnerState`] — lifecycle states (Idle → ... → Terminated)
//! - [`ShutdownSignal`] — process-wide cancellation token with
//!   interruptible sleep, the sole blocking primitive for tasks
//! - [`Task`], [`TaskFn`], [`TaskRef`] — bounded units of work (loop and
//!   post-loop tasks)
//! - [`Worker`], [`WorkerFn`], [`WorkerRef`] — long-lived, restartable
//!   units of work
//!
//! Internal modules:
//! - `loop_task`: the per-task serialization gate with stale recovery.

mod loop_task;
mod runner;
mod shutdown;
mod task;
mod worker;

pub use loop_task::STALE_AFTER;
pub use runner::{Runner, RunnerState};
pub use shutdown::ShutdownSignal;
pub use task::{BoxTaskFuture, Task, TaskFn, TaskRef};
pub use worker::{Worker, WorkerFn, WorkerRef};
