//! Scheduler driving every background activity of the agent and the monitor.
//!
//! A [`Scheduler`] is created once per process and handed to each component
//! that needs background work. Jobs run once or on a fixed period until the
//! scheduler is stopped; [`Scheduler::wait`] returns only after every spawned
//! job has run its teardown and observably finished.
//!
//! Cancellation is cooperative and only observed between ticks, so a tick
//! that has started always runs to completion.

use crate::core::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// A unit of background work.
#[async_trait::async_trait]
pub trait Task: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// One execution of the task body.
    async fn run(&self) -> Result<()>;

    /// Called once after a periodic loop has been cancelled.
    async fn teardown(&self) {}
}

/// Lifecycle of a scheduled job. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Stopped,
}

impl JobState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobState::Idle,
            1 => JobState::Running,
            _ => JobState::Stopped,
        }
    }
}

/// A task bound to its lifecycle. Clones share the same lifecycle.
#[derive(Clone)]
pub struct Job {
    task: Arc<dyn Task>,
    state: Arc<AtomicU8>,
}

impl Job {
    pub fn new(task: Arc<dyn Task>) -> Self {
        Self {
            task,
            state: Arc::new(AtomicU8::new(JobState::Idle as u8)),
        }
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Idle -> Running. Starting a job twice is a programming error.
    fn start(&self) {
        if self
            .state
            .compare_exchange(
                JobState::Idle as u8,
                JobState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            panic!("job '{}' started twice (state {:?})", self.name(), self.state());
        }
    }

    fn finish(&self) {
        self.state.store(JobState::Stopped as u8, Ordering::Release);
    }

    /// Run the body once. Errors and panics are logged and swallowed.
    async fn tick(&self) {
        match AssertUnwindSafe(self.task.run()).catch_unwind().await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(
                task = self.name(),
                error = %e,
                category = e.category(),
                recoverable = e.is_recoverable(),
                "Task run failed"
            ),
            Err(_) => error!(task = self.name(), "Task run panicked"),
        }
    }

    async fn teardown(&self) {
        if AssertUnwindSafe(self.task.teardown()).catch_unwind().await.is_err() {
            error!(task = self.name(), "Task teardown panicked");
        }
    }
}

/// Counts running jobs; `wait` resolves when the count drops to zero.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Default)]
struct WaitGroupInner {
    count: AtomicUsize,
    notify: Notify,
}

/// Held by a running job, released on drop.
pub struct WaitGuard {
    inner: Arc<WaitGroupInner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) -> WaitGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        WaitGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn active(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

/// Cancellation signal handed to jobs and long-running listeners.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&mut self) {
        // A dropped scheduler counts as cancellation.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Process-wide job scheduler.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    jobs: WaitGroup,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            jobs: WaitGroup::new(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown.subscribe(),
        }
    }

    /// Number of jobs that have not finished yet.
    pub fn active_jobs(&self) -> usize {
        self.jobs.active()
    }

    /// Run `job` once in the background.
    pub fn once(&self, job: Job) {
        job.start();
        let guard = self.jobs.add();
        tokio::spawn(async move {
            let _guard = guard;
            job.tick().await;
            job.finish();
        });
    }

    /// Run `job` every `period` until the scheduler stops, then tear it down.
    ///
    /// The first run happens one period after scheduling.
    pub fn periodic(&self, period: Duration, job: Job) {
        assert!(!period.is_zero(), "job '{}' scheduled with a zero period", job.name());
        job.start();
        let guard = self.jobs.add();
        let mut signal = self.shutdown_signal();

        tokio::spawn(async move {
            let _guard = guard;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = job.name(), period = ?period, "Periodic task started");

            loop {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => break,
                    _ = ticker.tick() => {},
                }
                job.tick().await;
            }

            job.teardown().await;
            job.finish();
            debug!(task = job.name(), "Periodic task stopped");
        });
    }

    /// Spawn a future that owns its own loop and watches the shutdown signal,
    /// such as the HTTP listener. `wait` also blocks on it.
    pub fn spawn_until_shutdown<F, Fut>(&self, name: &'static str, f: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let guard = self.jobs.add();
        let fut = f(self.shutdown_signal());
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = fut.await {
                error!(task = name, error = %e, "Background task failed");
            }
        });
    }

    /// Request cancellation of all jobs. Does not wait.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Block until every spawned job has finished.
    pub async fn wait(&self) {
        self.jobs.wait().await;
    }

    /// `stop` followed by `wait`.
    pub async fn shutdown(&self) {
        self.stop();
        self.wait().await;
    }
}
