//! # Runner: supervises workers, loop tasks, and cleanup.
//!
//! The [`Runner`] owns the event bus, the [`ShutdownSignal`], and the
//! registered work. One control loop drives everything:
//!
//! ```text
//! Idle ─► Starting ─► Looping ─────────────────► Stopping ─► Cleanup ─► Terminated
//!            │          │ each pass:                │            │
//!            │          │  1. interruptible sleep   │            └─ post-loop tasks,
//!            │          │  2. attempt loop tasks    │               sequential, failures
//!            │          │  3. check worker liveness │               logged and skipped
//!            │          │                           │
//!            │          └─ repeats until kill-now   └─ no new scheduling; drain
//!            │                                         in-flight tasks and workers
//!            └─ spawn one task per worker              within the grace period
//! ```
//!
//! ## Scheduling rules
//! - Within one pass a given loop task is attempted at most once via the
//!   normal path, plus at most one forced duplicate if its gate is stale.
//! - Workers have no ordering relative to each other or to loop tasks.
//! - A worker that exits while the runner is looping is resubmitted with
//!   its restart flag set if it supports the flag, otherwise dropped.
//! - Cancellation is cooperative: nothing is ever aborted. A stale gate is
//!   abandoned, not revoked; its holder keeps running. If the abandoned
//!   holder later resumes and writes, the relative ordering of its effects
//!   against the forced duplicate's is unspecified.
//!
//! ## Failure semantics
//! Every failure inside registered work is caught here, published to the
//! bus, and survived. Only two things abort `run`: OS signal listener
//! registration failing, and the grace period expiring with stuck tasks
//! (reported after cleanup has still run).

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::runtime::loop_task::LoopEntry;
use crate::runtime::task::TaskRef;
use crate::runtime::worker::WorkerRef;
use crate::runtime::ShutdownSignal;
use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};

/// Lifecycle states of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Constructed, not yet running.
    Idle,
    /// Spawning workers.
    Starting,
    /// Control loop active.
    Looping,
    /// Shutdown observed; draining in-flight work.
    Stopping,
    /// Running post-loop tasks.
    Cleanup,
    /// Done.
    Terminated,
}

struct WorkerEntry {
    worker: WorkerRef,
    starts: u32,
    handle: Option<JoinHandle<Result<(), TaskError>>>,
    dropped: bool,
}

type Inflight = Vec<(Arc<str>, JoinHandle<()>)>;

/// Supervises workers (long-lived, auto-restarted), loop tasks (bounded,
/// periodically invoked, stale-recovered), and post-loop tasks
/// (sequential cleanup).
pub struct Runner {
    cfg: Config,
    signal: ShutdownSignal,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    workers: Vec<WorkerEntry>,
    loop_tasks: Vec<Arc<LoopEntry>>,
    post_tasks: Vec<TaskRef>,
    state: StdMutex<RunnerState>,
}

impl Runner {
    /// Creates an idle runner with the given configuration.
    pub fn new(cfg: Config) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        Self {
            cfg,
            signal: ShutdownSignal::new(),
            bus,
            subscribers: Vec::new(),
            workers: Vec::new(),
            loop_tasks: Vec::new(),
            post_tasks: Vec::new(),
            state: StdMutex::new(RunnerState::Idle),
        }
    }

    /// Replaces the default [`LogWriter`] with custom subscribers.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Clone of the process-wide shutdown signal.
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Independent receiver of the runtime event stream.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers a long-lived worker. One task is spawned for it at
    /// startup and it is expected to run until shutdown.
    pub fn register_worker(&mut self, worker: WorkerRef) {
        self.workers.push(WorkerEntry {
            worker,
            starts: 0,
            handle: None,
            dropped: false,
        });
    }

    /// Registers a loop task with the configured default stale timeout.
    ///
    /// `sleep = Some(d)` serializes the task with its own prior run and
    /// holds the gate through an interruptible sleep of `d` after each
    /// execution (zero releases immediately). `sleep = None` disables
    /// serialization; the task runs every pass.
    pub fn register_loop_task(&mut self, task: TaskRef, sleep: Option<Duration>) {
        let stale_after = self.cfg.stale_after;
        self.register_loop_task_with_stale(task, sleep, stale_after);
    }

    /// Registers a loop task with an explicit stale timeout.
    pub fn register_loop_task_with_stale(
        &mut self,
        task: TaskRef,
        sleep: Option<Duration>,
        stale_after: Duration,
    ) {
        self.loop_tasks
            .push(Arc::new(LoopEntry::new(task, sleep, stale_after)));
    }

    /// Registers a post-loop task, run once during cleanup. Post-loop
    /// tasks execute sequentially in registration order; a failure is
    /// logged and does not prevent subsequent cleanup tasks.
    pub fn register_post_loop_task(&mut self, task: TaskRef) {
        self.post_tasks.push(task);
    }

    /// Runs until shutdown, then drains and cleans up.
    ///
    /// With `test_mode = true` the OS signal listener is not installed, so
    /// shutdown is driven purely through [`Runner::signal`].
    pub async fn run(&mut self, test_mode: bool) -> Result<(), RuntimeError> {
        self.set_state(RunnerState::Starting);
        let (listener_done, listener) = self.spawn_subscriber_listener();

        if !test_mode {
            if let Err(e) = self.signal.listen_for_os_signals() {
                listener_done.cancel();
                let _ = listener.await;
                return Err(e);
            }
        }

        self.start_workers();
        self.set_state(RunnerState::Looping);

        let mut inflight: Inflight = Vec::new();
        while !self.signal.kill_now() {
            if self.signal.sleep(self.cfg.sleep).await {
                self.bus.publish(Event::now(EventKind::Ping));
            }
            if self.signal.kill_now() {
                break;
            }
            inflight.retain(|(_, handle)| !handle.is_finished());
            self.run_loop_tasks(&mut inflight);
            self.restart_stopped_workers().await;
        }

        self.set_state(RunnerState::Stopping);
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        let drained = self.drain(inflight).await;

        self.set_state(RunnerState::Cleanup);
        self.run_post_loop_tasks().await;

        self.set_state(RunnerState::Terminated);
        listener_done.cancel();
        let _ = listener.await;
        drained
    }

    fn set_state(&self, state: RunnerState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Subscribes to the bus and fans events out to the subscriber set.
    /// Defaults to a single [`LogWriter`] when no subscribers were given.
    fn spawn_subscriber_listener(&mut self) -> (CancellationToken, JoinHandle<()>) {
        let subs = if self.subscribers.is_empty() {
            vec![Arc::new(LogWriter::new()) as Arc<dyn Subscribe>]
        } else {
            std::mem::take(&mut self.subscribers)
        };
        let set = SubscriberSet::new(subs, self.bus.clone());
        let mut rx = self.bus.subscribe();
        let done = CancellationToken::new();
        let stop = done.clone();

        let handle = tokio::spawn(async move {
            use tokio::sync::broadcast::error::{RecvError, TryRecvError};
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
            // Deliver whatever is still buffered, then flush the queues.
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            set.shutdown().await;
        });
        (done, handle)
    }

    fn start_workers(&mut self) {
        for entry in &mut self.workers {
            entry.starts = 1;
            self.bus.publish(
                Event::now(EventKind::WorkerStarting)
                    .with_task(entry.worker.name())
                    .with_attempt(entry.starts),
            );
            entry.handle = Some(Self::spawn_worker(
                entry.worker.clone(),
                self.signal.clone(),
                false,
            ));
        }
    }

    fn spawn_worker(
        worker: WorkerRef,
        signal: ShutdownSignal,
        restart: bool,
    ) -> JoinHandle<Result<(), TaskError>> {
        tokio::spawn(async move { worker.spawn(signal, restart).await })
    }

    /// Resubmits restart-aware workers that exited without a shutdown
    /// signal; drops the rest.
    async fn restart_stopped_workers(&mut self) {
        for entry in &mut self.workers {
            if entry.dropped {
                continue;
            }
            let finished = entry
                .handle
                .as_ref()
                .is_some_and(|handle| handle.is_finished());
            if !finished {
                continue;
            }
            let Some(handle) = entry.handle.take() else {
                continue;
            };
            let reason = match handle.await {
                Ok(Ok(())) => "exited without error".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(join_err) => format!("panicked: {join_err}"),
            };
            self.bus.publish(
                Event::now(EventKind::WorkerFailed)
                    .with_task(entry.worker.name())
                    .with_reason(reason.clone()),
            );

            if entry.worker.restart_aware() {
                entry.starts += 1;
                self.bus.publish(
                    Event::now(EventKind::WorkerRestarted)
                        .with_task(entry.worker.name())
                        .with_attempt(entry.starts),
                );
                entry.handle = Some(Self::spawn_worker(
                    entry.worker.clone(),
                    self.signal.clone(),
                    true,
                ));
            } else {
                entry.dropped = true;
                self.bus.publish(
                    Event::now(EventKind::WorkerDropped)
                        .with_task(entry.worker.name())
                        .with_reason(reason),
                );
            }
        }
    }

    /// One scheduling attempt for every registered loop task.
    fn run_loop_tasks(&self, inflight: &mut Inflight) {
        let now = Instant::now();
        for entry in &self.loop_tasks {
            if !entry.gated() {
                self.spawn_loop_exec(entry.clone(), false, inflight);
            } else if entry.try_begin(now) {
                self.spawn_loop_exec(entry.clone(), true, inflight);
            } else if entry.stale(now) {
                let since = entry.force_begin(now);
                self.bus.publish(
                    Event::now(EventKind::LoopTaskForced)
                        .with_task(entry.name())
                        .with_reason(format!("last run {}s ago", since.as_secs())),
                );
                self.spawn_loop_exec(entry.clone(), true, inflight);
            } else {
                self.bus
                    .publish(Event::now(EventKind::LoopTaskSkipped).with_task(entry.name()));
            }
        }
    }

    /// Runs one execution on its own task: body, optional hold sleep, gate
    /// release. Errors and panics are published; the gate is always
    /// released afterwards.
    fn spawn_loop_exec(&self, entry: Arc<LoopEntry>, release: bool, inflight: &mut Inflight) {
        let bus = self.bus.clone();
        let signal = self.signal.clone();
        let name: Arc<str> = Arc::from(entry.name());
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            bus.publish(Event::now(EventKind::LoopTaskStarting).with_task(task_name.clone()));
            let outcome = std::panic::AssertUnwindSafe(entry.task.spawn(signal.clone()))
                .catch_unwind()
                .await;
            let succeeded = match outcome {
                Ok(Ok(())) => {
                    bus.publish(Event::now(EventKind::LoopTaskStopped).with_task(task_name));
                    true
                }
                Ok(Err(e)) if e.is_graceful() => {
                    bus.publish(Event::now(EventKind::LoopTaskStopped).with_task(task_name));
                    true
                }
                Ok(Err(e)) => {
                    bus.publish(
                        Event::now(EventKind::LoopTaskFailed)
                            .with_task(task_name)
                            .with_reason(e.to_string()),
                    );
                    false
                }
                Err(panic_err) => {
                    bus.publish(
                        Event::now(EventKind::LoopTaskFailed)
                            .with_task(task_name)
                            .with_reason(format!("panicked: {panic_err:?}")),
                    );
                    false
                }
            };
            if release {
                // The hold applies after a successful run only; a failure
                // releases the gate immediately so the task resumes on the
                // next eligible pass.
                if succeeded {
                    if let Some(hold) = entry.sleep {
                        if !hold.is_zero() {
                            signal.sleep(hold).await;
                        }
                    }
                }
                entry.end();
            }
        });
        inflight.push((name, handle));
    }

    /// Waits for in-flight loop tasks and workers within the grace period.
    async fn drain(&mut self, inflight: Inflight) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let deadline = tokio::time::Instant::now() + grace;
        let mut stuck: Vec<String> = Vec::new();

        for (name, handle) in inflight {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                stuck.push(name.to_string());
            }
        }
        for entry in &mut self.workers {
            let Some(handle) = entry.handle.take() else {
                continue;
            };
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(_) => {
                    self.bus.publish(
                        Event::now(EventKind::WorkerStopped).with_task(entry.worker.name()),
                    );
                }
                Err(_elapsed) => stuck.push(entry.worker.name().to_string()),
            }
        }

        if stuck.is_empty() {
            self.bus.publish(Event::now(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus.publish(Event::now(EventKind::GraceExceeded));
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    /// Runs post-loop tasks once, sequentially, in registration order.
    async fn run_post_loop_tasks(&self) {
        for task in &self.post_tasks {
            self.bus
                .publish(Event::now(EventKind::PostTaskStarting).with_task(task.name()));
            let outcome = std::panic::AssertUnwindSafe(task.spawn(self.signal.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.bus.publish(
                        Event::now(EventKind::PostTaskFailed)
                            .with_task(task.name())
                            .with_reason(e.to_string()),
                    );
                }
                Err(panic_err) => {
                    self.bus.publish(
                        Event::now(EventKind::PostTaskFailed)
                            .with_task(task.name())
                            .with_reason(format!("panicked: {panic_err:?}")),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::task::TaskFn;
    use crate::runtime::worker::WorkerFn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config(sleep_ms: u64) -> Config {
        let mut cfg = Config::default();
        cfg.sleep = Duration::from_millis(sleep_ms);
        cfg.grace = Duration::from_secs(5);
        cfg
    }

    fn drain_events(
        rx: &mut tokio::sync::broadcast::Receiver<Event>,
    ) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn end_to_end_passes_then_graceful_shutdown() {
        let mut runner = Runner::new(test_config(50));
        let mut rx = runner.events();
        let signal = runner.signal();

        let worker_exits = Arc::new(AtomicUsize::new(0));
        let loop_runs = Arc::new(AtomicUsize::new(0));
        let post_runs = Arc::new(AtomicUsize::new(0));

        let exits = worker_exits.clone();
        runner.register_worker(WorkerFn::restartable(
            "queue-drainer",
            move |signal: ShutdownSignal, _restart| {
                let exits = exits.clone();
                async move {
                    while !signal.kill_now() {
                        signal.sleep(Duration::from_secs(1)).await;
                    }
                    exits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        let runs = loop_runs.clone();
        runner.register_loop_task(
            TaskFn::arc("tick", move |_signal: ShutdownSignal| {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            Some(Duration::ZERO),
        );

        let posts = post_runs.clone();
        runner.register_post_loop_task(TaskFn::arc(
            "final-sync",
            move |_signal: ShutdownSignal| {
                let posts = posts.clone();
                async move {
                    posts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        // Roughly three scheduling passes, then shutdown.
        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(180)).await;
            signal.shutdown();
        });

        runner.run(true).await.unwrap();
        driver.await.unwrap();

        let runs = loop_runs.load(Ordering::SeqCst);
        assert!((1..=4).contains(&runs), "loop task ran {runs} times");
        assert_eq!(post_runs.load(Ordering::SeqCst), 1);
        assert_eq!(worker_exits.load(Ordering::SeqCst), 1);
        assert_eq!(runner.state(), RunnerState::Terminated);

        let kinds = drain_events(&mut rx);
        assert!(!kinds.contains(&EventKind::WorkerRestarted));
        assert!(!kinds.contains(&EventKind::WorkerDropped));
        assert!(kinds.contains(&EventKind::WorkerStopped));
        assert!(kinds.contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn restart_aware_worker_is_resubmitted_with_flag() {
        let mut runner = Runner::new(test_config(30));
        let mut rx = runner.events();
        let signal = runner.signal();

        let restart_seen = Arc::new(AtomicUsize::new(0));
        let seen = restart_seen.clone();
        runner.register_worker(WorkerFn::restartable(
            "flaky",
            move |signal: ShutdownSignal, restart: bool| {
                let seen = seen.clone();
                async move {
                    if !restart {
                        // First incarnation dies immediately.
                        return Err(TaskError::Fail {
                            error: "connection refused".into(),
                        });
                    }
                    seen.fetch_add(1, Ordering::SeqCst);
                    while !signal.kill_now() {
                        signal.sleep(Duration::from_secs(1)).await;
                    }
                    Ok(())
                }
            },
        ));

        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            signal.shutdown();
        });
        runner.run(true).await.unwrap();
        driver.await.unwrap();

        assert_eq!(restart_seen.load(Ordering::SeqCst), 1);
        let kinds = drain_events(&mut rx);
        assert!(kinds.contains(&EventKind::WorkerFailed));
        assert!(kinds.contains(&EventKind::WorkerRestarted));
    }

    #[tokio::test]
    async fn restart_unaware_worker_is_dropped_and_runner_survives() {
        let mut runner = Runner::new(test_config(30));
        let mut rx = runner.events();
        let signal = runner.signal();

        runner.register_worker(WorkerFn::arc(
            "one-shot",
            move |_signal: ShutdownSignal, _restart| async move { Ok(()) },
        ));

        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            signal.shutdown();
        });
        runner.run(true).await.unwrap();
        driver.await.unwrap();

        let kinds = drain_events(&mut rx);
        assert!(kinds.contains(&EventKind::WorkerDropped));
        assert!(!kinds.contains(&EventKind::WorkerRestarted));
    }

    #[tokio::test]
    async fn failing_loop_task_is_logged_and_retried_next_pass() {
        let mut runner = Runner::new(test_config(30));
        let mut rx = runner.events();
        let signal = runner.signal();

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        runner.register_loop_task(
            TaskFn::arc("wobbly", move |_signal: ShutdownSignal| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TaskError::Fail {
                        error: "nope".into(),
                    })
                }
            }),
            Some(Duration::ZERO),
        );

        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            signal.shutdown();
        });
        runner.run(true).await.unwrap();
        driver.await.unwrap();

        assert!(attempts.load(Ordering::SeqCst) >= 2);
        let kinds = drain_events(&mut rx);
        assert!(kinds.contains(&EventKind::LoopTaskFailed));
    }

    #[tokio::test]
    async fn stale_gate_forces_a_single_duplicate() {
        let mut runner = Runner::new(test_config(40));
        let mut rx = runner.events();
        let signal = runner.signal();

        let starts = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));
        let max_live = Arc::new(AtomicUsize::new(0));

        let s = starts.clone();
        let l = live.clone();
        let m = max_live.clone();
        runner.register_loop_task_with_stale(
            TaskFn::arc("sticky", move |signal: ShutdownSignal| {
                let first = s.fetch_add(1, Ordering::SeqCst) == 0;
                let l = l.clone();
                let m = m.clone();
                async move {
                    let now_live = l.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now_live, Ordering::SeqCst);
                    if first {
                        // Hang far past the stale timeout; wakes on shutdown.
                        signal.sleep(Duration::from_secs(10)).await;
                    }
                    l.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            Some(Duration::ZERO),
            Duration::from_millis(100),
        );

        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            signal.shutdown();
        });
        runner.run(true).await.unwrap();
        driver.await.unwrap();

        let kinds = drain_events(&mut rx);
        let forced = kinds
            .iter()
            .filter(|k| **k == EventKind::LoopTaskForced)
            .count();
        assert_eq!(forced, 1, "expected exactly one forced duplicate");
        assert_eq!(
            max_live.load(Ordering::SeqCst),
            2,
            "never more than two concurrent executions"
        );
    }

    #[tokio::test]
    async fn post_loop_failure_does_not_stop_remaining_cleanup() {
        let mut runner = Runner::new(test_config(30));
        let mut rx = runner.events();
        let signal = runner.signal();

        let second_ran = Arc::new(AtomicUsize::new(0));
        runner.register_post_loop_task(TaskFn::arc(
            "broken-cleanup",
            |_signal: ShutdownSignal| async {
                Err(TaskError::Fail {
                    error: "disk full".into(),
                })
            },
        ));
        let ran = second_ran.clone();
        runner.register_post_loop_task(TaskFn::arc(
            "second-cleanup",
            move |_signal: ShutdownSignal| {
                let ran = ran.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        signal.shutdown();
        runner.run(true).await.unwrap();

        assert_eq!(second_ran.load(Ordering::SeqCst), 1);
        let kinds = drain_events(&mut rx);
        assert!(kinds.contains(&EventKind::PostTaskFailed));
    }
}
