//! Scheduler engine implementation.
//!
//! The scheduler polls every registered queue on a fixed cadence,
//! independent of any individual trigger's interval: a job's actual
//! start time drifts from its due instant by at most one polling
//! period. Queue runs and drain passes are spawned concurrently; the
//! driver loop never waits for job completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::buffer::{migrate, OutcomeBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::core::job::{Job, JobFailure, JobOutcome};
use crate::queue::Queue;

/// Name of the queue every scheduler is constructed with.
pub const DEFAULT_QUEUE: &str = "default";

/// How long the driver loop pauses between polling cycles.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur when operating the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called while the driver loop is already running.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// No queue is registered under the given name.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
}

type BufferSlot<T> = Arc<RwLock<Arc<OutcomeBuffer<T>>>>;

/// The top-level driver polling all registered queues.
pub struct Scheduler {
    queues: Arc<RwLock<HashMap<String, Arc<Queue>>>>,
    /// Exclusive running flag; at most one driver loop at a time.
    running: Arc<AtomicBool>,
    outcomes: BufferSlot<JobOutcome>,
    failures: BufferSlot<JobFailure>,
    poll_interval: Duration,
    /// Driver task handle, kept so shutdown can be awaited later.
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler with a single queue registered under
    /// [`DEFAULT_QUEUE`] and aggregate buffers of the default capacity.
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        queues.insert(DEFAULT_QUEUE.to_string(), Arc::new(Queue::new()));
        Self {
            queues: Arc::new(RwLock::new(queues)),
            running: Arc::new(AtomicBool::new(false)),
            outcomes: Arc::new(RwLock::new(Arc::new(OutcomeBuffer::new(
                DEFAULT_BUFFER_CAPACITY,
            )))),
            failures: Arc::new(RwLock::new(Arc::new(OutcomeBuffer::new(
                DEFAULT_BUFFER_CAPACITY,
            )))),
            poll_interval: DEFAULT_POLL_INTERVAL,
            driver: Mutex::new(None),
        }
    }

    /// Set the polling interval of the driver loop.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Add a job to the default queue.
    pub async fn add(&self, job: Arc<Job>) -> Result<(), SchedulerError> {
        self.add_to_queue(DEFAULT_QUEUE, job).await
    }

    /// Add a job to the named queue.
    pub async fn add_to_queue(&self, name: &str, job: Arc<Job>) -> Result<(), SchedulerError> {
        let queues = self.queues.read().await;
        let queue = queues
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownQueue(name.to_string()))?;
        queue.add(job).await;
        Ok(())
    }

    /// Register a queue under a name, overwriting any existing entry.
    ///
    /// Buffer-capacity settings applied to the scheduler earlier are
    /// not retroactively applied to queues registered afterward; set
    /// the queue's capacities yourself if they should match.
    pub async fn register_queue(&self, name: impl Into<String>, queue: Arc<Queue>) {
        self.queues.write().await.insert(name.into(), queue);
    }

    /// Look up a registered queue by name.
    pub async fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.read().await.get(name).cloned()
    }

    /// Whether the driver loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Launch the background driver loop.
    ///
    /// Each iteration spawns every registered queue's run cycle and a
    /// drain pass moving that queue's buffered outcomes and failures
    /// into the scheduler's aggregate buffers, then pauses for the
    /// polling interval. The loop exits after the iteration in which
    /// it observes [`Scheduler::stop`].
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let running = Arc::clone(&self.running);
        let queues = Arc::clone(&self.queues);
        let outcomes = Arc::clone(&self.outcomes);
        let failures = Arc::clone(&self.failures);
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            tracing::debug!("scheduler driver started");
            while running.load(Ordering::Acquire) {
                let snapshot: Vec<Arc<Queue>> =
                    queues.read().await.values().cloned().collect();
                for queue in snapshot {
                    let runner = Arc::clone(&queue);
                    tokio::spawn(async move {
                        runner.run().await;
                    });

                    let outcomes = Arc::clone(&outcomes);
                    let failures = Arc::clone(&failures);
                    tokio::spawn(async move {
                        drain_queue(&queue, &outcomes, &failures).await;
                    });
                }
                tokio::time::sleep(poll_interval).await;
            }
            tracing::debug!("scheduler driver stopped");
        });

        *self.driver.lock().expect("driver lock poisoned") = Some(handle);
        Ok(())
    }

    /// Tell the driver loop to exit.
    ///
    /// Cooperative, not immediate: the flag is sampled once per
    /// polling cycle, and executions already launched continue to
    /// completion and may still publish into queue buffers after the
    /// loop has exited. A final drain is advisable if every outcome
    /// matters.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Wait for the driver loop to exit after [`Scheduler::stop`].
    ///
    /// Returns immediately when the scheduler was never started. Does
    /// not wait for job executions already in flight; use
    /// [`Queue::wait_idle`] on the individual queues for that.
    pub async fn wait_stopped(&self) {
        let handle = self.driver.lock().expect("driver lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// The current aggregate outcome buffer handle. Identity changes
    /// across a capacity change.
    pub async fn outcomes(&self) -> Arc<OutcomeBuffer<JobOutcome>> {
        Arc::clone(&*self.outcomes.read().await)
    }

    /// The current aggregate failure buffer handle. Identity changes
    /// across a capacity change.
    pub async fn failures(&self) -> Arc<OutcomeBuffer<JobFailure>> {
        Arc::clone(&*self.failures.read().await)
    }

    /// Resize the aggregate outcome buffer (entries migrate
    /// oldest-first) and apply the same capacity to every currently
    /// registered queue. Queues registered later are unaffected.
    pub async fn set_outcome_capacity(&self, capacity: usize) {
        {
            let mut slot = self.outcomes.write().await;
            *slot = migrate(&slot, capacity);
        }
        let queues: Vec<Arc<Queue>> = self.queues.read().await.values().cloned().collect();
        for queue in queues {
            queue.set_outcome_capacity(capacity).await;
        }
    }

    /// Resize the aggregate failure buffer and propagate to every
    /// currently registered queue. Same contract as
    /// [`Scheduler::set_outcome_capacity`].
    pub async fn set_failure_capacity(&self, capacity: usize) {
        {
            let mut slot = self.failures.write().await;
            *slot = migrate(&slot, capacity);
        }
        let queues: Vec<Arc<Queue>> = self.queues.read().await.values().cloned().collect();
        for queue in queues {
            queue.set_failure_capacity(capacity).await;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // The driver loop holds its own clones of the shared state;
        // clear the flag so it exits instead of looping detached.
        self.running.store(false, Ordering::Release);
    }
}

/// Move everything currently buffered in `queue` into the scheduler's
/// aggregate buffers. Entries that do not fit are dropped and counted
/// by the aggregate buffer.
async fn drain_queue(
    queue: &Queue,
    outcomes: &RwLock<Arc<OutcomeBuffer<JobOutcome>>>,
    failures: &RwLock<Arc<OutcomeBuffer<JobFailure>>>,
) {
    let outcome_sink = Arc::clone(&*outcomes.read().await);
    for entry in queue.outcomes().await.drain() {
        if !outcome_sink.publish(entry) {
            tracing::warn!(
                dropped = outcome_sink.dropped(),
                "aggregate outcome buffer full, entry dropped"
            );
        }
    }

    let failure_sink = Arc::clone(&*failures.read().await);
    for entry in queue.failures().await.drain() {
        if !failure_sink.publish(entry) {
            tracing::warn!(
                dropped = failure_sink.dropped(),
                "aggregate failure buffer full, entry dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::callable::from_fn;
    use chrono::Utc;
    use serde_json::Value;

    #[tokio::test]
    async fn test_constructed_with_default_queue() {
        let scheduler = Scheduler::new();
        assert!(scheduler.queue(DEFAULT_QUEUE).await.is_some());
        assert!(scheduler.queue("nightly").await.is_none());
    }

    #[tokio::test]
    async fn test_add_to_unknown_queue_fails() {
        let scheduler = Scheduler::new();
        let job = Arc::new(
            Job::new("j", Arc::new(from_fn(0, |_| Ok(Vec::new()))), Vec::new()).unwrap(),
        );
        let err = scheduler.add_to_queue("nightly", job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownQueue(name) if name == "nightly"));
    }

    #[tokio::test]
    async fn test_add_targets_default_queue() {
        let scheduler = Scheduler::new();
        let job = Arc::new(
            Job::new("j", Arc::new(from_fn(0, |_| Ok(Vec::new()))), Vec::new()).unwrap(),
        );
        scheduler.add(job).await.unwrap();
        assert_eq!(scheduler.queue(DEFAULT_QUEUE).await.unwrap().len().await, 1);
    }

    #[tokio::test]
    async fn test_register_queue_overwrites() {
        let scheduler = Scheduler::new();
        let replacement = Arc::new(Queue::new());
        scheduler
            .register_queue(DEFAULT_QUEUE, Arc::clone(&replacement))
            .await;
        let registered = scheduler.queue(DEFAULT_QUEUE).await.unwrap();
        assert!(Arc::ptr_eq(&registered, &replacement));
    }

    #[tokio::test]
    async fn test_second_start_fails_and_first_loop_survives() {
        let scheduler = Scheduler::new().with_poll_interval(Duration::from_millis(5));
        scheduler.start().unwrap();

        let err = scheduler.start().unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        assert!(scheduler.is_running());

        scheduler.stop();
        assert!(!scheduler.is_running());
        scheduler.wait_stopped().await;
        // Once stopped, a fresh start is allowed again.
        scheduler.start().unwrap();
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_capacity_propagates_to_current_queues_only() {
        let scheduler = Scheduler::new();
        scheduler.set_outcome_capacity(25).await;
        assert_eq!(scheduler.outcomes().await.capacity(), 25);
        assert_eq!(
            scheduler
                .queue(DEFAULT_QUEUE)
                .await
                .unwrap()
                .outcomes()
                .await
                .capacity(),
            25
        );

        // A queue registered afterward keeps its own capacity.
        scheduler
            .register_queue("late", Arc::new(Queue::new()))
            .await;
        assert_eq!(
            scheduler
                .queue("late")
                .await
                .unwrap()
                .outcomes()
                .await
                .capacity(),
            DEFAULT_BUFFER_CAPACITY
        );
    }

    #[tokio::test]
    async fn test_aggregate_resize_preserves_entries() {
        let scheduler = Scheduler::new();
        scheduler.failures().await.publish(JobFailure {
            job: "kept".into(),
            error: crate::core::job::JobError::Invocation("x".into()),
        });

        scheduler.set_failure_capacity(50).await;

        let buffer = scheduler.failures().await;
        assert_eq!(buffer.capacity(), 50);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_driver_drains_queue_outcomes_upward() {
        let scheduler = Scheduler::new().with_poll_interval(Duration::from_millis(5));
        let job = Arc::new(
            Job::new(
                "ping",
                Arc::new(from_fn(0, |_| Ok(vec![Value::from("pong")]))),
                Vec::new(),
            )
            .unwrap(),
        );
        job.schedule()
            .every("1ms")
            .unwrap()
            .limit(1)
            .starting_at(Utc::now() - chrono::Duration::seconds(1));
        scheduler.add(job).await.unwrap();

        scheduler.start().unwrap();

        // Poll the aggregate buffer instead of sleeping a fixed time.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let entry = loop {
            if let Some(entry) = scheduler.outcomes().await.pop() {
                break entry;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "outcome never reached the scheduler buffer"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        scheduler.stop();

        assert_eq!(entry.job, "ping");
        assert_eq!(entry.values, vec![Value::from("pong")]);
    }
}
