//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — event classification and payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the [`Runner`](crate::Runner) control loop, worker
//!   supervision, loop-task executions, and `SubscriberSet` workers
//!   (overflow/panic).
//! - **Consumer**: the runner's subscriber listener, which fans out to the
//!   [`SubscriberSet`](crate::subscribers::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
