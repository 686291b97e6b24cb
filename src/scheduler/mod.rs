//! The top-level driver.
//!
//! A [`Scheduler`] owns a name-keyed registry of queues and runs a
//! polling loop that triggers every queue's run cycle and drains each
//! queue's buffers into its own aggregate buffers.

mod engine;

pub use engine::{Scheduler, SchedulerError, DEFAULT_QUEUE};
