//! Tickloop - in-process recurring task scheduler
//!
//! Tickloop lets an application register named units of work ("triggers")
//! that fire at a computed future instant, repeat on a policy (fixed
//! interval, weekly day/time, bounded count, or forever), and run on
//! managed worker pools with retry and failure-isolation semantics.
//!
//! # Core Concepts
//!
//! - **Delay-ordered dispatch**: a single dispatcher task drains a
//!   time-ordered wait structure; triggers fire in due-time order, ties
//!   broken by insertion id
//! - **One pending occurrence per name**: registering a second trigger
//!   while one with the same name is pending is an error
//! - **Two re-arming disciplines**: eager (next occurrence armed at
//!   dequeue, runs may overlap) and sequence (next occurrence armed only
//!   after the current run and its retries finish)
//! - **Slow-task routing**: occurrences whose last run exceeded the slow
//!   threshold are routed to a larger worker pool
//!
//! # Modules
//!
//! - [`trigger`] - Trigger entity, recurrence policies, factory constructors
//! - [`scheduler`] - Registration API, wait structure, dispatcher loop
//! - [`pool`] - Worker pool trait and the fixed-worker implementation
//! - [`runner`] - Per-occurrence execution wrapper (retry, cost, routing)
//! - [`sequence`] - Process-wide monotonic id source

pub mod error;
pub mod pool;
pub mod runner;
pub mod scheduler;
pub mod sequence;
pub mod trigger;

// Re-export commonly used types
pub use error::SchedulerError;
pub use pool::{FixedWorkerPool, WorkerPool};
pub use runner::TaskRunner;
pub use scheduler::{PoolConfig, Scheduler, SchedulerConfig};
pub use trigger::{ErrorHandler, Job, Recurrence, Trigger, factory, job};
