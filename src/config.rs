//! # Global runtime configuration.
//!
//! [`Config`] centralizes the knobs consumed by the core: scheduler
//! cadence, shutdown grace, event-bus capacity, loop-task staleness,
//! rate-limiter ceilings, and the persistence backend selection.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use magpie::{BackendKind, Config};
//!
//! let mut cfg = Config::default();
//! cfg.sleep = Duration::from_secs(15);
//! cfg.grace = Duration::from_secs(10);
//! cfg.backend = BackendKind::Remote {
//!     base_url: "http://kv.internal:7379".into(),
//!     namespace: Some("magpie".into()),
//! };
//!
//! assert_eq!(cfg.post_budget, 300);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::limiter::{DEFAULT_CEILING, POST_BUDGET, POST_RESET_EVERY, RateLimiter, WINDOW};
use crate::runtime::STALE_AFTER;
use crate::store::Store;

/// Persistence backend selection, made once at construction.
#[derive(Clone, Debug)]
pub enum BackendKind {
    /// Single local mapping file.
    File {
        /// Path of the backing file.
        path: PathBuf,
    },
    /// Remote HTTP key-value service.
    Remote {
        /// Service base URL.
        base_url: String,
        /// Optional key prefix, letting several bots share one service.
        namespace: Option<String>,
    },
}

/// Global configuration for the runtime, limiter, and store.
#[derive(Clone, Debug)]
pub struct Config {
    /// Scheduler cadence: how long the control loop sleeps between passes.
    pub sleep: Duration,
    /// Maximum time to wait for tasks to stop during shutdown.
    pub grace: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Default stale timeout for loop-task gates.
    pub stale_after: Duration,
    /// Rolling window over which per-endpoint calls are limited.
    pub window: Duration,
    /// Default per-endpoint ceiling within one window.
    pub default_ceiling: u32,
    /// Fixed budget for post-class actions.
    pub post_budget: u32,
    /// Interval after which the post budget resets to full.
    pub post_reset_every: Duration,
    /// Persistence backend for the store.
    pub backend: BackendKind,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `sleep = 5s`
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    /// - `stale_after = 120s`
    /// - `window = 15min`, `default_ceiling = 15`
    /// - `post_budget = 300`, `post_reset_every = 3h`
    /// - `backend = File { "magpie.json" }`
    fn default() -> Self {
        Self {
            sleep: Duration::from_secs(5),
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            stale_after: STALE_AFTER,
            window: WINDOW,
            default_ceiling: DEFAULT_CEILING,
            post_budget: POST_BUDGET,
            post_reset_every: POST_RESET_EVERY,
            backend: BackendKind::File {
                path: PathBuf::from("magpie.json"),
            },
        }
    }
}

impl Config {
    /// Builds the rate limiter described by this configuration.
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.window,
            self.default_ceiling,
            self.post_budget,
            self.post_reset_every,
        )
    }

    /// Builds a (closed) store over the configured backend. Register the
    /// schema with `add_key`, then `open()`.
    pub fn store(&self) -> Store {
        match &self.backend {
            BackendKind::File { path } => Store::file(path.clone()),
            BackendKind::Remote {
                base_url,
                namespace,
            } => Store::remote(base_url.clone(), namespace.clone()),
        }
    }
}
