//! Trigger entity and recurrence policies
//!
//! A `Trigger` is one occurrence of a named job with a concrete due time.
//! A logical job (identified by name) produces a chain of occurrences over
//! time: each firing computes its successor from the recurrence policy,
//! giving it a fresh id, a reseeded retry counter, and a new due time.
//! The soft-cancel flag and the last recorded run cost live in state
//! shared by every occurrence of the chain.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use tracing::error;

use crate::sequence;

pub mod factory;
mod recurrence;

pub use recurrence::Recurrence;

/// The job callable: receives the firing occurrence, returns a future
/// resolving to success or failure-with-cause
pub type Job = Arc<dyn for<'a> Fn(&'a Trigger) -> BoxFuture<'static, eyre::Result<()>> + Send + Sync>;

/// Handler invoked once per failed job attempt
pub type ErrorHandler = Arc<dyn Fn(&Trigger, &eyre::Report) + Send + Sync>;

/// Wrap an async closure into a [`Job`]
///
/// The closure runs synchronously with the trigger borrowed, so clone out
/// whatever the returned future needs.
pub fn job<F, Fut>(f: F) -> Job
where
    F: for<'a> Fn(&'a Trigger) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    Arc::new(move |trigger| Box::pin(f(trigger)))
}

/// State shared by every occurrence of a logical job
///
/// The cost cell is shared so that eager re-arming (where the successor is
/// created before the current run completes) still routes on the most
/// recently completed run.
#[derive(Debug, Default)]
pub(crate) struct TriggerShared {
    cancelled: AtomicBool,
    cost_time_ms: AtomicU64,
}

impl TriggerShared {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One occurrence of a named recurring job
#[derive(Clone)]
pub struct Trigger {
    id: i64,
    name: String,
    create_time: DateTime<Local>,
    execute_time: DateTime<Local>,
    previous_time: Option<DateTime<Local>>,
    sequence: bool,
    retry_limit: u32,
    retry_remaining: u32,
    recurrence: Recurrence,
    shared: Arc<TriggerShared>,
    job: Job,
    on_error: Option<ErrorHandler>,
}

impl Trigger {
    pub(crate) fn new(name: &str, execute_time: DateTime<Local>, recurrence: Recurrence, job: Job) -> Self {
        Self {
            id: sequence::next_id(),
            name: name.to_string(),
            create_time: Local::now(),
            execute_time,
            previous_time: None,
            sequence: false,
            retry_limit: 0,
            retry_remaining: 0,
            recurrence,
            shared: Arc::new(TriggerShared::default()),
            job,
            on_error: None,
        }
    }

    /// Occurrence id, fresh per firing, monotonic across the process
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Logical job name, stable across occurrences
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instant the logical job was first constructed
    pub fn create_time(&self) -> DateTime<Local> {
        self.create_time
    }

    /// Instant this occurrence is due
    pub fn execute_time(&self) -> DateTime<Local> {
        self.execute_time
    }

    /// Instant the prior occurrence fired, if any
    pub fn previous_time(&self) -> Option<DateTime<Local>> {
        self.previous_time
    }

    /// Whether this job chains serially (next occurrence armed only after
    /// the current run finishes)
    pub fn is_sequence(&self) -> bool {
        self.sequence
    }

    /// Retries allowed per occurrence
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// The recurrence policy driving this job's occurrence chain
    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    /// Duration of the last completed run in milliseconds
    ///
    /// Consumed by the dispatcher's slow-task routing on the next firing.
    pub fn cost_time_ms(&self) -> u64 {
        self.shared.cost_time_ms.load(Ordering::SeqCst)
    }

    /// Soft-cancel this logical job
    ///
    /// Takes effect the next time the trigger is considered: suppresses
    /// re-arming and skips the job body at fire time. Does not free the
    /// name for re-registration until the pending occurrence is dequeued;
    /// use [`crate::Scheduler::schedule_cancel`] for that.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Switch between serial chaining (`true`) and eager re-arming
    /// (`false`, the default)
    pub fn sequence(mut self, sequence: bool) -> Self {
        self.sequence = sequence;
        self
    }

    /// Allow `times` retries per occurrence after a failed run
    pub fn retry(mut self, times: u32) -> Self {
        self.retry_limit = times;
        self.retry_remaining = times;
        self
    }

    /// Install a handler for failed job attempts
    ///
    /// Without one, failures are logged by the default handler.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Trigger, &eyre::Report) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Compute the successor occurrence, if the policy has one
    ///
    /// Returns `None` if cancelled, if a bounded count is exhausted, or if
    /// an interval end boundary has passed. The successor carries a fresh
    /// id, `previous_time = now`, a reseeded retry counter, and shares the
    /// cancel flag and cost cell with this occurrence.
    pub fn next_occurrence(&self) -> Option<Trigger> {
        if self.is_cancelled() {
            return None;
        }

        let now = Local::now();
        let (recurrence, execute_time) = self.recurrence.advance(now)?;

        Some(Trigger {
            id: sequence::next_id(),
            name: self.name.clone(),
            create_time: self.create_time,
            execute_time,
            previous_time: Some(now),
            sequence: self.sequence,
            retry_limit: self.retry_limit,
            retry_remaining: self.retry_limit,
            recurrence,
            shared: Arc::clone(&self.shared),
            job: Arc::clone(&self.job),
            on_error: self.on_error.clone(),
        })
    }

    /// Run the job callable against this occurrence
    pub(crate) fn invoke(&self) -> BoxFuture<'static, eyre::Result<()>> {
        (self.job)(self)
    }

    /// Route a failed attempt to the configured handler, or log it
    pub(crate) fn route_failure(&self, cause: &eyre::Report) {
        match &self.on_error {
            Some(handler) => handler(self, cause),
            None => error!(trigger = %self.name, error = %cause, "job run error"),
        }
    }

    pub(crate) fn retry_remaining(&self) -> u32 {
        self.retry_remaining
    }

    pub(crate) fn record_cost(&self, elapsed_ms: u64) {
        self.shared.cost_time_ms.store(elapsed_ms, Ordering::SeqCst);
    }

    pub(crate) fn shared(&self) -> &Arc<TriggerShared> {
        &self.shared
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("create_time", &self.create_time)
            .field("execute_time", &self.execute_time)
            .field("previous_time", &self.previous_time)
            .field("sequence", &self.sequence)
            .field("retry_limit", &self.retry_limit)
            .field("retry_remaining", &self.retry_remaining)
            .field("cancelled", &self.is_cancelled())
            .field("cost_time_ms", &self.cost_time_ms())
            .field("recurrence", &self.recurrence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn noop() -> Job {
        job(|_| async { Ok(()) })
    }

    #[test]
    fn test_builder_defaults() {
        let trigger = factory::once("t", Local::now(), noop()).expect("valid trigger");

        assert!(!trigger.is_sequence());
        assert_eq!(trigger.retry_limit(), 0);
        assert!(!trigger.is_cancelled());
        assert_eq!(trigger.cost_time_ms(), 0);
        assert!(trigger.previous_time().is_none());
    }

    #[test]
    fn test_retry_seeds_remaining() {
        let trigger = factory::once("t", Local::now(), noop()).expect("valid trigger").retry(3);

        assert_eq!(trigger.retry_limit(), 3);
        assert_eq!(trigger.retry_remaining(), 3);
    }

    #[test]
    fn test_next_occurrence_gets_fresh_id_and_reseeded_retries() {
        let trigger = factory::forever("t", TimeDelta::seconds(1), Local::now(), noop())
            .expect("valid trigger")
            .retry(2);

        let next = trigger.next_occurrence().expect("forever trigger has a successor");

        assert!(next.id() > trigger.id());
        assert_eq!(next.name(), "t");
        assert_eq!(next.retry_remaining(), 2);
        assert!(next.previous_time().is_some());
        assert_eq!(next.create_time(), trigger.create_time());
    }

    #[test]
    fn test_cancel_is_shared_across_occurrences() {
        let trigger = factory::forever("t", TimeDelta::seconds(1), Local::now(), noop()).expect("valid trigger");
        let next = trigger.next_occurrence().expect("successor");

        trigger.cancel();

        assert!(next.is_cancelled());
        assert!(next.next_occurrence().is_none());
    }

    #[test]
    fn test_cost_is_shared_across_occurrences() {
        let trigger = factory::forever("t", TimeDelta::seconds(1), Local::now(), noop()).expect("valid trigger");
        let next = trigger.next_occurrence().expect("successor");

        trigger.record_cost(250);

        assert_eq!(next.cost_time_ms(), 250);
    }
}
