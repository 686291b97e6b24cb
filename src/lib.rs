//! `recur` is an in-process recurring-task scheduler.
//!
//! Callers wrap callables in [`Job`]s with independent fixed-interval
//! recurrence rules, group them into named [`Queue`]s, and consume
//! asynchronous results and errors through bounded buffers at the
//! queue or [`Scheduler`] level.
//!
//! ```ignore
//! use recur::{callable, Job, Scheduler};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = Arc::new(Job::new(
//!     "heartbeat",
//!     Arc::new(callable::from_fn(0, |_| Ok(vec![Value::from("alive")]))),
//!     Vec::new(),
//! )?);
//! job.schedule().every("15m")?;
//!
//! let scheduler = Scheduler::new();
//! scheduler.add(job).await?;
//! scheduler.start()?;
//!
//! // ... later, from the embedding application:
//! for outcome in scheduler.outcomes().await.drain() {
//!     println!("{}: {:?}", outcome.job, outcome.values);
//! }
//! scheduler.stop();
//! # Ok(())
//! # }
//! ```
//!
//! Delivery is best-effort: buffers are bounded and publishing never
//! blocks, so unconsumed entries beyond a buffer's capacity are
//! dropped and counted. Schedules and run history are not persisted.

pub mod buffer;
pub mod core;
pub mod queue;
pub mod scheduler;

pub use crate::buffer::{OutcomeBuffer, DEFAULT_BUFFER_CAPACITY};
pub use crate::core::callable::{self, CallError, Callable};
pub use crate::core::job::{Job, JobError, JobFailure, JobOutcome};
pub use crate::core::trigger::{Trigger, TriggerError};
pub use crate::queue::Queue;
pub use crate::scheduler::{Scheduler, SchedulerError, DEFAULT_QUEUE};
