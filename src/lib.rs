//! # magpie
//!
//! **Magpie** is a runtime for long-running posting bots: it supervises the
//! bot's workers and periodic tasks, persists durable state across
//! restarts, and keeps outbound calls inside an external service's
//! call-rate ceilings.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!      ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//!      │   Worker    │   │  LoopTask   │   │ PostLoopTask │
//!      │ (long-lived)│   │ (periodic)  │   │  (cleanup)   │
//!      └──────┬──────┘   └──────┬──────┘   └──────┬───────┘
//!             ▼                 ▼                 ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │  Runner (control loop)                                     │
//! │  - spawns one task per Worker, restarts on unexpected exit │
//! │  - attempts LoopTasks each pass (gate + stale recovery)    │
//! │  - runs PostLoopTasks sequentially after shutdown          │
//! │  - publishes lifecycle Events to the Bus                   │
//! └──────┬──────────────────────┬──────────────────────┬──────┘
//!        ▼                      ▼                      ▼
//!  ShutdownSignal          Bus ─► SubscriberSet   Store ─► Backend
//!  (cancellation token,    (LogWriter, custom     (schema-typed;
//!   interruptible sleep)    sinks)                 file or remote KV)
//!                                                      │
//!                                   RateLimiter        └─► SyncedList
//!                                   (window + post         (list slots,
//!                                    budget)                remote-backed)
//! ```
//!
//! ### Control loop
//! ```text
//! run(test_mode):
//!   Starting: spawn all Workers
//!   Looping, each pass:
//!     ├─► interruptible sleep (cadence; wakes on shutdown/ping)
//!     ├─► attempt every LoopTask:
//!     │     gate free   → run on its own task
//!     │     gate held   → skip, unless stale → force one duplicate
//!     └─► check Worker liveness → resubmit restart-aware exits
//!   Stopping: drain in-flight work within the grace period
//!   Cleanup:  PostLoopTasks, sequential, failures logged and skipped
//! ```
//!
//! Bot logic runs inside the registered callables: it reads and writes
//! durable state through the [`Store`], and consults the [`RateLimiter`]
//! before every outbound call. Every caught error is published as an
//! [`Event`] and the process keeps running; only a backend unreachable at
//! startup or a schema misconfiguration at registration time is fatal.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use magpie::{Config, Runner, ShutdownSignal, TaskError, TaskFn, WorkerFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.sleep = Duration::from_millis(50);
//!
//!     let mut runner = Runner::new(cfg);
//!     let signal = runner.signal();
//!
//!     runner.register_worker(WorkerFn::restartable(
//!         "poster",
//!         |signal: ShutdownSignal, _restart| async move {
//!             while !signal.kill_now() {
//!                 signal.sleep(Duration::from_secs(1)).await;
//!                 // drain the outgoing queue...
//!             }
//!             Ok::<_, TaskError>(())
//!         },
//!     ));
//!
//!     runner.register_loop_task(
//!         TaskFn::arc("mentions", |_signal: ShutdownSignal| async move {
//!             // fetch mentions, enqueue replies...
//!             Ok::<_, TaskError>(())
//!         }),
//!         Some(Duration::ZERO),
//!     );
//!
//!     // Elsewhere: signal.shutdown() on whatever condition ends the bot.
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(120)).await;
//!         signal.shutdown();
//!     });
//!
//!     runner.run(true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//! | Area           | Description                                              | Key types                                |
//! |----------------|----------------------------------------------------------|------------------------------------------|
//! | **Store**      | Schema-typed durable state, two backends, list proxy.    | [`Store`], [`Value`], [`SyncedList`]     |
//! | **Runtime**    | Worker supervision, periodic tasks, stale recovery.      | [`Runner`], [`Worker`], [`Task`]         |
//! | **Limiting**   | Rolling-window ceilings plus a fixed post budget.        | [`RateLimiter`]                          |
//! | **Shutdown**   | Cooperative cancellation with interruptible sleep.       | [`ShutdownSignal`]                       |
//! | **Events**     | Lifecycle event stream with pluggable subscribers.       | [`Event`], [`Subscribe`], [`LogWriter`]  |
//! | **Errors**     | Typed errors per failure domain.                         | [`StoreError`], [`TaskError`]            |

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod limiter;
pub mod runtime;
pub mod store;
pub mod subscribers;

// ---- Public re-exports ----

pub use api::{Message, PostingClient, TextEngine};
pub use config::{BackendKind, Config};
pub use error::{BackendError, RuntimeError, SchemaError, StoreError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use limiter::RateLimiter;
pub use runtime::{Runner, RunnerState, ShutdownSignal, Task, TaskFn, Worker, WorkerFn};
pub use store::{Store, SyncedList, Value, ValueKind};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
