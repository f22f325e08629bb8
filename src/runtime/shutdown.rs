//! # Cooperative shutdown signal.
//!
//! [`ShutdownSignal`] is the process-wide cancellation token plus the sole
//! blocking primitive available to workers and loop tasks: an interruptible
//! [`sleep`](ShutdownSignal::sleep) that wakes as soon as shutdown is
//! requested or a ping arrives, bounding worst-case shutdown latency to
//! well under a second.
//!
//! Cancellation is cooperative, never forced: tasks poll
//! [`kill_now`](ShutdownSignal::kill_now) (or await
//! [`cancelled`](ShutdownSignal::cancelled)) and exit on their own.
//!
//! ## OS signals
//! One cross-platform listener translates OS signals into the token:
//!
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal), `SIGTERM` (systemd/Kubernetes),
//!   `SIGQUIT` → [`shutdown`](ShutdownSignal::shutdown)
//! - `SIGUSR1` → [`ping`](ShutdownSignal::ping) (pokes sleepers, proves
//!   liveness without stopping anything)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → shutdown
//!
//! ## Example
//! ```
//! use magpie::ShutdownSignal;
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let signal = ShutdownSignal::new();
//!     let sleeper = signal.clone();
//!
//!     let handle = tokio::spawn(async move {
//!         // Would block for an hour; wakes as soon as shutdown arrives.
//!         sleeper.sleep(Duration::from_secs(3600)).await;
//!         assert!(sleeper.kill_now());
//!     });
//!
//!     signal.shutdown();
//!     handle.await.unwrap();
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::RuntimeError;

struct PingState {
    flag: AtomicBool,
    notify: Notify,
}

/// Process-wide cooperative cancellation token with interruptible sleep.
///
/// Cheap to clone; all clones share the same kill-now and ping state.
#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
    ping: Arc<PingState>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Creates a fresh signal. One per process lifetime.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            ping: Arc::new(PingState {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Requests shutdown: sets kill-now and wakes every sleeper.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// True once shutdown has been requested.
    pub fn kill_now(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when shutdown is requested. For use in `select!`.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Pokes every sleeper without stopping anything.
    ///
    /// The next (or current) [`sleep`](ShutdownSignal::sleep) call observes
    /// the ping, wakes, and answers `true`.
    pub fn ping(&self) {
        self.ping.flag.store(true, Ordering::Release);
        self.ping.notify.notify_waiters();
    }

    /// Waits up to `duration`, waking early as soon as kill-now is set or a
    /// ping arrives during the wait.
    ///
    /// Returns whether a ping was consumed, independent of an early wake
    /// caused by kill-now.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.ping.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag, so a ping landing
        // between the check and the select cannot be lost.
        notified.as_mut().enable();
        if self.consume_ping() {
            return true;
        }

        tokio::select! {
            _ = self.token.cancelled() => self.consume_ping(),
            _ = &mut notified => {
                self.consume_ping();
                true
            }
            _ = tokio::time::sleep(duration) => self.consume_ping(),
        }
    }

    /// Installs the cross-platform OS signal listener.
    ///
    /// Each call registers independent listeners; the runner installs
    /// exactly one per `run()` unless running in test mode. Registration
    /// failure is surfaced immediately; the listener itself runs detached.
    #[cfg(unix)]
    pub fn listen_for_os_signals(&self) -> Result<(), RuntimeError> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;

        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = sigint.recv()  => break,
                    _ = sigterm.recv() => break,
                    _ = sigquit.recv() => break,
                    _ = sigusr1.recv() => {
                        this.ping();
                        continue;
                    }
                }
            }
            this.shutdown();
        });
        Ok(())
    }

    /// Installs the cross-platform OS signal listener.
    ///
    /// Each call registers independent listeners; the runner installs
    /// exactly one per `run()` unless running in test mode.
    #[cfg(not(unix))]
    pub fn listen_for_os_signals(&self) -> Result<(), RuntimeError> {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            this.shutdown();
        });
        Ok(())
    }

    fn consume_ping(&self) -> bool {
        self.ping.flag.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleep_returns_promptly_after_shutdown() {
        let signal = ShutdownSignal::new();
        let sleeper = signal.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let pinged = sleeper.sleep(Duration::from_secs(10)).await;
            (started.elapsed(), pinged)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.shutdown();

        let (elapsed, pinged) = handle.await.unwrap();
        assert!(elapsed < Duration::from_secs(1), "woke after {elapsed:?}");
        assert!(!pinged);
    }

    #[tokio::test]
    async fn sleep_reports_ping_and_wakes_early() {
        let signal = ShutdownSignal::new();
        let sleeper = signal.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let pinged = sleeper.sleep(Duration::from_secs(10)).await;
            (started.elapsed(), pinged)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.ping();

        let (elapsed, pinged) = handle.await.unwrap();
        assert!(elapsed < Duration::from_secs(1));
        assert!(pinged);
        assert!(!signal.kill_now());
    }

    #[tokio::test]
    async fn ping_before_sleep_is_consumed_once() {
        let signal = ShutdownSignal::new();
        signal.ping();

        assert!(signal.sleep(Duration::from_millis(1)).await);
        assert!(!signal.sleep(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn sleep_elapses_normally_without_interrupts() {
        let signal = ShutdownSignal::new();
        let started = Instant::now();
        let pinged = signal.sleep(Duration::from_millis(30)).await;
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!pinged);
    }
}
