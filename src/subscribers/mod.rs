//! # Event subscribers for the magpie runtime.
//!
//! The [`Subscribe`] trait plus built-in implementations for handling
//! runtime events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ```text
//! Event flow:
//!   Runner ── publish(Event) ──► Bus ──► runner listener ──► SubscriberSet
//!                                                           ┌─────┴─────┐
//!                                                           ▼           ▼
//!                                                       LogWriter   custom sinks
//! ```
//!
//! ## Implementing custom subscribers
//! ```
//! use magpie::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::LoopTaskFailed {
//!             // increment a counter...
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failure-counter"
//!     }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
