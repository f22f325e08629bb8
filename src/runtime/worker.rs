//! # Workers: long-lived units of work.
//!
//! A [`Worker`] is expected to run for the process lifetime, looping on the
//! [`ShutdownSignal`]'s interruptible sleep. When a worker exits while the
//! runner is still looping, the runner resubmits it with `restart = true`
//! if the worker [declares support](Worker::restart_aware) for the flag;
//! otherwise the worker is dropped and the drop is logged.
//!
//! The restart flag lets a worker distinguish a cold start from a restart
//! after unexpected exit, e.g. to release locks or re-prime queues its
//! previous incarnation left behind.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use crate::error::TaskError;
use crate::runtime::ShutdownSignal;
use crate::runtime::task::BoxTaskFuture;

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;

/// # A long-lived, restartable unit of work.
pub trait Worker: Send + Sync + 'static {
    /// Returns a stable, human-readable worker name.
    fn name(&self) -> &str;

    /// Starts one incarnation. `restart` is `true` when this incarnation
    /// replaces one that exited unexpectedly.
    fn spawn(&self, signal: ShutdownSignal, restart: bool) -> BoxTaskFuture;

    /// Whether the worker understands the restart flag. Workers that do
    /// not are dropped instead of resubmitted after an unexpected exit.
    fn restart_aware(&self) -> bool {
        false
    }
}

/// Function-backed worker implementation.
///
/// The closure receives the signal and the restart flag and produces a
/// fresh future per incarnation.
///
/// ## Example
/// ```
/// use magpie::{ShutdownSignal, TaskError, WorkerFn};
/// use magpie::runtime::WorkerRef;
/// use std::time::Duration;
///
/// let w: WorkerRef = WorkerFn::restartable("poster", |signal: ShutdownSignal, restart| {
///     async move {
///         if restart {
///             // previous incarnation died; clean up before resuming
///         }
///         while !signal.kill_now() {
///             signal.sleep(Duration::from_secs(1)).await;
///             // drain the queue...
///         }
///         Ok::<_, TaskError>(())
///     }
/// });
/// assert!(w.restart_aware());
/// ```
pub struct WorkerFn<F> {
    name: Cow<'static, str>,
    f: F,
    restart_aware: bool,
}

impl<F> WorkerFn<F> {
    /// Creates a worker that does not understand the restart flag; it is
    /// dropped after an unexpected exit.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            f,
            restart_aware: false,
        })
    }

    /// Creates a restart-aware worker; it is resubmitted with
    /// `restart = true` after an unexpected exit.
    pub fn restartable(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            f,
            restart_aware: true,
        })
    }
}

impl<F, Fut> Worker for WorkerFn<F>
where
    F: Fn(ShutdownSignal, bool) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, signal: ShutdownSignal, restart: bool) -> BoxTaskFuture {
        Box::pin((self.f)(signal, restart))
    }

    fn restart_aware(&self) -> bool {
        self.restart_aware
    }
}
