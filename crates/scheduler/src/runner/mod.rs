//! Scheduler runner -- barrier state machine, backlog draining and timers.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, and read-only queries
//! - `submission`: submit / initialize / reset and the barrier transitions
//! - `execution`: serialized body execution and backlog draining
//! - `timers`: starvation watchdog and per-task deadlines

mod core;
mod execution;
mod submission;
mod timers;

pub use self::core::Scheduler;
