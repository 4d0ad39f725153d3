//! Deferred eviction.
//!
//! An [`EvictionScheduler`] runs a job once a deadline has passed. Jobs are
//! keyed by [`EvictionTarget`]; scheduling a target again replaces its
//! pending job, and cancelling an unknown target is a no-op.
//!
//! Jobs must tolerate running late, running after the target was already
//! removed, or not running at all: the lifecycle manager re-checks the
//! deadline against its clock and its periodic sweep catches anything a
//! scheduler dropped.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::clock::Clock;

/// What a scheduled job evicts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvictionTarget {
    /// Artifact by name
    Artifact(String),
    /// Secret record by value
    Secret(String),
}

impl fmt::Display for EvictionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionTarget::Artifact(name) => write!(f, "artifact:{}", name),
            EvictionTarget::Secret(value) => write!(f, "secret:{}", value),
        }
    }
}

/// A one-shot eviction callback
pub type EvictionJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs after their deadline.
pub trait EvictionScheduler: Send + Sync {
    /// Arm `job` for `target`, to run once `deadline` is strictly in the past.
    /// Replaces any job already pending for the same target.
    fn schedule(&self, deadline: DateTime<Utc>, target: EvictionTarget, job: EvictionJob);

    /// Drop the pending job for `target`. Returns whether one was pending.
    fn cancel(&self, target: &EvictionTarget) -> bool;

    /// Number of jobs not yet run or cancelled
    fn pending(&self) -> usize;
}

/// Slack added after the deadline so the job observes `now > deadline`.
const DEADLINE_SLACK_MS: i64 = 1;

/// One tokio task per target.
///
/// Each task sleeps until just past its deadline (as measured by the clock
/// at scheduling time), then hands its job to the blocking pool: jobs do
/// store I/O and must not stall the runtime's workers.
pub struct TokioScheduler {
    handle: Handle,
    clock: Arc<dyn Clock>,
    tasks: Arc<Mutex<HashMap<EvictionTarget, (u64, AbortHandle)>>>,
    next_generation: AtomicU64,
}

impl TokioScheduler {
    pub fn new(handle: Handle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Abort every pending task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, (_, task)) in tasks.drain() {
            task.abort();
        }
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl EvictionScheduler for TokioScheduler {
    fn schedule(&self, deadline: DateTime<Utc>, target: EvictionTarget, job: EvictionJob) {
        let delay = (deadline - self.clock.now() + Duration::milliseconds(DEADLINE_SLACK_MS))
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Hold the map while spawning so the task cannot finish and clean up
        // before its own entry exists.
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let registry = Arc::clone(&self.tasks);
        let key = target.clone();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                tracing::warn!(evict = %key, error = %e, "eviction job failed");
            }
            let mut tasks = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(tasks.get(&key), Some((g, _)) if *g == generation) {
                tasks.remove(&key);
            }
        });

        tracing::debug!(evict = %target, delay_ms = delay.as_millis() as u64, "eviction armed");
        if let Some((_, previous)) = tasks.insert(target, (generation, join.abort_handle())) {
            previous.abort();
        }
    }

    fn cancel(&self, target: &EvictionTarget) -> bool {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target);
        match removed {
            Some((_, task)) => {
                task.abort();
                tracing::debug!(evict = %target, "eviction cancelled");
                true
            }
            None => false,
        }
    }

    fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct QueuedJob {
    deadline: DateTime<Utc>,
    target: EvictionTarget,
    job: EvictionJob,
}

/// Queue that only runs jobs when asked.
///
/// Used by tests and by one-shot CLI invocations, where the process does
/// not live long enough for a timer to fire.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<QueuedJob>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadlines of pending jobs, soonest first
    pub fn deadlines(&self) -> Vec<(DateTime<Utc>, EvictionTarget)> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = queue
            .iter()
            .map(|q| (q.deadline, q.target.clone()))
            .collect();
        out.sort();
        out
    }

    /// Run every job whose deadline is strictly before `now`.
    /// Returns how many ran.
    pub fn run_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<QueuedJob> = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let (due, rest): (Vec<_>, Vec<_>) = queue.drain(..).partition(|q| q.deadline < now);
            *queue = rest;
            due
        };
        let count = due.len();
        for q in due {
            (q.job)();
        }
        count
    }

    /// Run everything regardless of deadline.
    pub fn run_all(&self) -> usize {
        let all: Vec<QueuedJob> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let count = all.len();
        for q in all {
            (q.job)();
        }
        count
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl EvictionScheduler for ManualScheduler {
    fn schedule(&self, deadline: DateTime<Utc>, target: EvictionTarget, job: EvictionJob) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.retain(|q| q.target != target);
        queue.push(QueuedJob {
            deadline,
            target,
            job,
        });
    }

    fn cancel(&self, target: &EvictionTarget) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let before = queue.len();
        queue.retain(|q| &q.target != target);
        queue.len() != before
    }

    fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn counter_job(counter: &Arc<AtomicUsize>) -> EvictionJob {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_runs_strictly_after_deadline() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let deadline = t0() + Duration::seconds(120);
        scheduler.schedule(
            deadline,
            EvictionTarget::Artifact("logs/a.log".into()),
            counter_job(&ran),
        );

        assert_eq!(scheduler.run_due(deadline), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.run_due(deadline + Duration::seconds(1)), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_manual_reschedule_replaces_and_cancel() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let target = EvictionTarget::Secret("CTF{a}".into());

        scheduler.schedule(t0(), target.clone(), counter_job(&ran));
        scheduler.schedule(t0() + Duration::seconds(10), target.clone(), counter_job(&ran));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.deadlines()[0].0, t0() + Duration::seconds(10));

        assert!(scheduler.cancel(&target));
        assert!(!scheduler.cancel(&target));
        assert_eq!(scheduler.run_all(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_fires_after_deadline() {
        let clock = ManualClock::new(t0());
        let scheduler = TokioScheduler::new(Handle::current(), Arc::new(clock.clone()));
        let ran = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            t0() + Duration::seconds(120),
            EvictionTarget::Artifact("flags/a.txt".into()),
            counter_job(&ran),
        );
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_cancel_and_replace() {
        let clock = ManualClock::new(t0());
        let scheduler = TokioScheduler::new(Handle::current(), Arc::new(clock));
        let ran = Arc::new(AtomicUsize::new(0));
        let target = EvictionTarget::Artifact("logs/b.log".into());

        scheduler.schedule(t0() + Duration::seconds(5), target.clone(), counter_job(&ran));
        scheduler.schedule(t0() + Duration::seconds(10), target.clone(), counter_job(&ran));
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(std::time::Duration::from_secs(7)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert!(scheduler.cancel(&target));
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_jobs_run_off_the_runtime_thread() {
        let clock = ManualClock::new(t0());
        let scheduler = TokioScheduler::new(Handle::current(), Arc::new(clock));
        let runtime_thread = std::thread::current().id();
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        scheduler.schedule(
            t0() + Duration::seconds(1),
            EvictionTarget::Artifact("uploads/c.png".into()),
            Box::new(move || {
                *slot.lock().unwrap() = Some(std::thread::current().id());
            }),
        );

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let job_thread = seen.lock().unwrap().expect("job did not run");
        assert_ne!(job_thread, runtime_thread);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(
            EvictionTarget::Artifact("logs/a.log".into()).to_string(),
            "artifact:logs/a.log"
        );
        assert_eq!(EvictionTarget::Secret("CTF{a}".into()).to_string(), "secret:CTF{a}");
    }
}
