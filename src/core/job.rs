//! Job definition and execution.
//!
//! A [`Job`] pairs a [`Callable`] with its bound arguments, a
//! [`Trigger`] describing when it recurs, and the timestamp of its last
//! fault-free run. Executing a job never propagates a fault: panics
//! inside the callable are intercepted and reported as a structured
//! error alongside ordinary failures.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::callable::{CallError, Callable};
use super::trigger::Trigger;

/// Errors that can occur when constructing or running a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job could not be constructed for the given callable.
    #[error("cannot construct job: {0}")]
    Construction(String),

    /// The bound arguments did not match the callable's signature at
    /// invocation time.
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// The callable ran and failed.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// The callable panicked; the panic was intercepted and its
    /// payload captured.
    #[error("job panicked: {0}")]
    Panicked(String),
}

/// A named result record: the values a job returned from one run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Name of the job that produced the values.
    pub job: String,
    /// Returned values, in return order.
    pub values: Vec<Value>,
}

/// A named error record: the failure a job produced from one run.
#[derive(Debug)]
pub struct JobFailure {
    /// Name of the job that failed.
    pub job: String,
    /// The captured error.
    pub error: JobError,
}

/// An executable unit: a callable, its bound arguments, and a schedule.
///
/// Jobs are shared as `Arc<Job>`; identity (pointer equality), not
/// value, determines uniqueness within a queue.
pub struct Job {
    name: String,
    callable: Arc<dyn Callable>,
    args: Vec<Value>,
    trigger: Mutex<Trigger>,
    /// Timestamp of the last fault-free run. Advances only on success,
    /// so a failed job stays eligible for retry on the next due cycle.
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("trigger", &self.trigger)
            .field("last_run", &self.last_run)
            .finish()
    }
}

impl Job {
    /// Create a new job wrapping `callable` with `args` bound to it.
    ///
    /// Fails with [`JobError::Construction`] when the number of bound
    /// arguments does not match the callable's arity.
    pub fn new(
        name: impl Into<String>,
        callable: Arc<dyn Callable>,
        args: Vec<Value>,
    ) -> Result<Self, JobError> {
        if args.len() != callable.arity() {
            return Err(JobError::Construction(format!(
                "callable expects {} argument(s), {} bound",
                callable.arity(),
                args.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            callable,
            args,
            trigger: Mutex::new(Trigger::new()),
            last_run: Mutex::new(None),
        })
    }

    /// Get the job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bound arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Get the timestamp of the last fault-free run, if any.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.lock().expect("last_run lock poisoned")
    }

    /// Access the current trigger for configuration.
    pub fn schedule(&self) -> MutexGuard<'_, Trigger> {
        self.trigger.lock().expect("trigger lock poisoned")
    }

    /// Discard the current trigger and install a fresh one, returning
    /// it for configuration chaining:
    ///
    /// ```ignore
    /// job.reschedule().every("15m")?.limit(4);
    /// ```
    pub fn reschedule(&self) -> MutexGuard<'_, Trigger> {
        let mut guard = self.trigger.lock().expect("trigger lock poisoned");
        *guard = Trigger::new();
        guard
    }

    /// Compute the next due time at or after `now`.
    ///
    /// Returns `None` when the trigger produces nothing, or when the
    /// candidate is not strictly after the last-run watermark (a due
    /// time already consumed by a prior successful run is never
    /// re-dispatched).
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self
            .trigger
            .lock()
            .expect("trigger lock poisoned")
            .next(now)?;
        match self.last_run() {
            Some(last) if next <= last => None,
            _ => Some(next),
        }
    }

    /// Invoke the callable with the bound arguments.
    ///
    /// A fault-free invocation captures the returned values in order
    /// and advances the last-run watermark. Every error path — an
    /// argument mismatch, an ordinary failure, or an intercepted panic
    /// — leaves the watermark untouched.
    pub async fn run(&self) -> Result<Vec<Value>, JobError> {
        let invocation = AssertUnwindSafe(self.callable.call(self.args.clone()))
            .catch_unwind()
            .await;

        match invocation {
            Ok(Ok(values)) => {
                *self.last_run.lock().expect("last_run lock poisoned") = Some(Utc::now());
                Ok(values)
            }
            Ok(Err(CallError::Arguments(msg))) => Err(JobError::ArgumentMismatch(msg)),
            Ok(Err(CallError::Failed(msg))) => Err(JobError::Invocation(msg)),
            Err(payload) => Err(JobError::Panicked(panic_message(payload))),
        }
    }
}

/// Extract a readable message from a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::callable::from_fn;

    fn noop_job(name: &str) -> Job {
        Job::new(name, Arc::new(from_fn(0, |_| Ok(Vec::new()))), Vec::new()).unwrap()
    }

    #[test]
    fn test_construction_rejects_arity_mismatch() {
        let callable = Arc::new(from_fn(2, |_| Ok(Vec::new())));
        let err = Job::new("short", callable, vec![Value::from(1)]).unwrap_err();
        assert!(matches!(err, JobError::Construction(_)));
    }

    #[tokio::test]
    async fn test_run_captures_values_and_advances_watermark() {
        let callable = Arc::new(from_fn(0, |_| {
            Ok(vec![Value::from("first"), Value::from("second")])
        }));
        let job = Job::new("ordered", callable, Vec::new()).unwrap();
        assert!(job.last_run().is_none());

        let values = job.run().await.unwrap();
        assert_eq!(values, vec![Value::from("first"), Value::from("second")]);
        assert!(job.last_run().is_some());
    }

    #[tokio::test]
    async fn test_failed_run_leaves_watermark_untouched() {
        let callable = Arc::new(from_fn(0, |_| {
            Err(CallError::Failed("went sideways".into()))
        }));
        let job = Job::new("failing", callable, Vec::new()).unwrap();

        let err = job.run().await.unwrap_err();
        assert!(matches!(err, JobError::Invocation(_)));
        assert!(job.last_run().is_none());
    }

    #[tokio::test]
    async fn test_panicking_callable_is_intercepted() {
        let callable = Arc::new(from_fn(0, |_| panic!("boom")));
        let job = Job::new("panicky", callable, Vec::new()).unwrap();

        match job.run().await.unwrap_err() {
            JobError::Panicked(msg) => assert_eq!(msg, "boom"),
            other => panic!("expected Panicked, got {other:?}"),
        }
        assert!(job.last_run().is_none());
    }

    #[tokio::test]
    async fn test_argument_mismatch_is_reported_not_fatal() {
        let callable = Arc::new(from_fn(1, |args| {
            args[0]
                .as_i64()
                .map(|n| vec![Value::from(n)])
                .ok_or_else(|| CallError::Arguments("expected an integer".into()))
        }));
        let job = Job::new("typed", callable, vec![Value::from("not a number")]).unwrap();

        let err = job.run().await.unwrap_err();
        assert!(matches!(err, JobError::ArgumentMismatch(_)));
        assert!(job.last_run().is_none());
    }

    #[tokio::test]
    async fn test_next_due_suppresses_consumed_occurrence() {
        let job = noop_job("once");
        job.schedule()
            .every("1ms")
            .unwrap()
            .limit(1)
            .starting_at(Utc::now() - chrono::Duration::seconds(1));

        // The single (past) occurrence is due.
        assert!(job.next_due(Utc::now()).is_some());

        // Consume it.
        job.run().await.unwrap();

        // The frozen final occurrence now sits behind the watermark.
        assert!(job.next_due(Utc::now()).is_none());
    }

    #[test]
    fn test_reschedule_installs_fresh_trigger() {
        let job = noop_job("rescheduled");
        job.schedule().every("1h").unwrap().limit(2);

        job.reschedule().every("15m").unwrap();
        let trigger = job.schedule();
        assert_eq!(trigger.interval(), std::time::Duration::from_secs(900));
        assert_eq!(trigger.repeat_limit(), 0);
    }
}
