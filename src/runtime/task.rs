//! # Task abstraction and function-backed implementation.
//!
//! A [`Task`] is a named async callable driven by the runner: loop tasks
//! run one bounded execution per scheduling pass, post-loop tasks run once
//! during cleanup. Both receive the [`ShutdownSignal`] and are expected to
//! poll it (or use its interruptible sleep) so shutdown stays prompt.
//!
//! [`TaskFn`] wraps a closure `F: Fn(ShutdownSignal) -> Fut`, producing a
//! fresh future per execution, so there is no hidden shared state between
//! runs; share state explicitly via `Arc` captured by the closure.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TaskError;
use crate::runtime::ShutdownSignal;

/// Boxed future returned by a task execution.
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

/// # A named, cancelable unit of work.
///
/// Implementors should regularly check `signal.kill_now()` and exit
/// promptly during shutdown.
///
/// # Example
/// ```
/// use magpie::{ShutdownSignal, Task, TaskError};
/// use magpie::runtime::BoxTaskFuture;
///
/// struct FetchMentions;
///
/// impl Task for FetchMentions {
///     fn name(&self) -> &str { "fetch-mentions" }
///
///     fn spawn(&self, signal: ShutdownSignal) -> BoxTaskFuture {
///         Box::pin(async move {
///             if signal.kill_now() {
///                 return Err(TaskError::Canceled);
///             }
///             // fetch and enqueue replies...
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Starts one execution, producing a fresh future.
    fn spawn(&self, signal: ShutdownSignal) -> BoxTaskFuture;
}

/// Function-backed task implementation.
///
/// Wraps a closure that creates a new future per execution.
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the task and returns it as a shared handle.
    ///
    /// ## Example
    /// ```
    /// use magpie::{ShutdownSignal, TaskError, TaskFn};
    /// use magpie::runtime::TaskRef;
    ///
    /// let t: TaskRef = TaskFn::arc("scan", |_signal: ShutdownSignal| async {
    ///     Ok::<_, TaskError>(())
    /// });
    /// assert_eq!(t.name(), "scan");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(ShutdownSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, signal: ShutdownSignal) -> BoxTaskFuture {
        Box::pin((self.f)(signal))
    }
}
