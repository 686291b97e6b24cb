//! Core types: triggers, callables, and jobs.

pub mod callable;
pub mod job;
pub mod trigger;
