//! Named job queues.
//!
//! A [`Queue`] owns an ordered, duplicate-free collection of jobs and a
//! suspend flag. Each run cycle dispatches every due job as its own
//! tokio task and collects outcomes into two bounded buffers, one for
//! results and one for failures. Dispatch is fire-and-forget: `run`
//! returns as soon as the due executions are spawned.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::buffer::{migrate, OutcomeBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::core::job::{Job, JobFailure, JobOutcome};

/// A named collection of jobs dispatched together.
pub struct Queue {
    /// Registered jobs, unique by `Arc` identity.
    jobs: RwLock<Vec<Arc<Job>>>,
    /// Suspended queues never dispatch; effective from the next run.
    suspended: AtomicBool,
    outcomes: RwLock<Arc<OutcomeBuffer<JobOutcome>>>,
    failures: RwLock<Arc<OutcomeBuffer<JobFailure>>>,
    /// Handles of spawned executions, pruned on each run.
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue {
    /// Create an empty queue with outcome and failure buffers of the
    /// default capacity.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            suspended: AtomicBool::new(false),
            outcomes: RwLock::new(Arc::new(OutcomeBuffer::new(DEFAULT_BUFFER_CAPACITY))),
            failures: RwLock::new(Arc::new(OutcomeBuffer::new(DEFAULT_BUFFER_CAPACITY))),
            inflight: Mutex::new(Vec::new()),
        }
    }

    /// Append a job unless the same job (by identity) is already
    /// present. Idempotent.
    pub async fn add(&self, job: Arc<Job>) {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|existing| Arc::ptr_eq(existing, &job)) {
            return;
        }
        jobs.push(job);
    }

    /// Number of registered jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the queue has no registered jobs.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Suspend the queue; no jobs are dispatched until resumed.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    /// Resume a suspended queue; jobs are checked on the next run.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    /// Whether the queue is suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Dispatch every due job as an independent tokio task.
    ///
    /// Each execution publishes a [`JobOutcome`] when the callable
    /// returned any values, or a [`JobFailure`] when it failed, into
    /// the buffer handles snapshotted at dispatch time. Returns after
    /// spawning; never waits for completion. No-op while suspended.
    pub async fn run(&self) {
        if self.is_suspended() {
            return;
        }

        // Executions publish into the buffers current at dispatch
        // time; a capacity change mid-flight detaches these handles
        // and any late publish into them is lost.
        let outcomes = Arc::clone(&*self.outcomes.read().await);
        let failures = Arc::clone(&*self.failures.read().await);

        let now = Utc::now();
        let mut spawned = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for job in jobs.iter() {
                match job.next_due(now) {
                    Some(due) if due <= now => {}
                    _ => continue,
                }
                tracing::debug!(job = job.name(), "dispatching due job");

                let job = Arc::clone(job);
                let outcomes = Arc::clone(&outcomes);
                let failures = Arc::clone(&failures);
                spawned.push(tokio::spawn(async move {
                    execute(job, outcomes, failures).await;
                }));
            }
        }

        let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
        inflight.retain(|handle| !handle.is_finished());
        inflight.extend(spawned);
    }

    /// Wait for every tracked in-flight execution to finish.
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
            inflight.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// The current outcome buffer handle.
    ///
    /// The handle's identity changes across a capacity change; callers
    /// should re-fetch rather than hold one long-term.
    pub async fn outcomes(&self) -> Arc<OutcomeBuffer<JobOutcome>> {
        Arc::clone(&*self.outcomes.read().await)
    }

    /// The current failure buffer handle. See [`Queue::outcomes`] for
    /// the identity caveat.
    pub async fn failures(&self) -> Arc<OutcomeBuffer<JobFailure>> {
        Arc::clone(&*self.failures.read().await)
    }

    /// Replace the outcome buffer with one of the given capacity.
    ///
    /// Queued entries migrate oldest-first up to the new capacity;
    /// excess entries are dropped. The swap happens under the slot's
    /// write lock, so no new dispatch can race it. Executions that
    /// snapshotted the old handle before the swap may publish into the
    /// detached buffer, and those entries are lost.
    pub async fn set_outcome_capacity(&self, capacity: usize) {
        let mut slot = self.outcomes.write().await;
        *slot = migrate(&slot, capacity);
    }

    /// Replace the failure buffer with one of the given capacity.
    /// Same contract as [`Queue::set_outcome_capacity`].
    pub async fn set_failure_capacity(&self, capacity: usize) {
        let mut slot = self.failures.write().await;
        *slot = migrate(&slot, capacity);
    }
}

/// Run one job and publish its outcome or failure.
async fn execute(
    job: Arc<Job>,
    outcomes: Arc<OutcomeBuffer<JobOutcome>>,
    failures: Arc<OutcomeBuffer<JobFailure>>,
) {
    match job.run().await {
        Ok(values) => {
            if values.is_empty() {
                return;
            }
            let record = JobOutcome {
                job: job.name().to_string(),
                values,
            };
            if !outcomes.publish(record) {
                tracing::warn!(
                    job = job.name(),
                    dropped = outcomes.dropped(),
                    "outcome buffer full, entry dropped"
                );
            }
        }
        Err(error) => {
            tracing::warn!(job = job.name(), error = %error, "job execution failed");
            let record = JobFailure {
                job: job.name().to_string(),
                error,
            };
            if !failures.publish(record) {
                tracing::warn!(
                    job = job.name(),
                    dropped = failures.dropped(),
                    "failure buffer full, entry dropped"
                );
            }
        }
    }
}
