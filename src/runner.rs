//! Per-occurrence execution wrapper
//!
//! Runs exactly one firing occurrence on a worker: skips soft-cancelled
//! occurrences, retries failed runs, routes failures to the trigger's
//! handler, measures cost for slow-task routing, and re-arms
//! sequence-mode jobs once everything has finished.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;
use crate::trigger::Trigger;

/// One firing occurrence, bound to the scheduler that dispatched it
pub struct TaskRunner {
    trigger: Trigger,
    scheduler: Scheduler,
}

impl TaskRunner {
    pub(crate) fn new(trigger: Trigger, scheduler: Scheduler) -> Self {
        Self { trigger, scheduler }
    }

    /// Run the occurrence to completion
    ///
    /// For eager jobs the successor was already armed at dequeue; for
    /// sequence jobs it is armed here, only after the run and its retries
    /// have returned.
    pub async fn run(self) {
        let Self { trigger, scheduler } = self;

        if trigger.is_cancelled() {
            warn!(trigger = %trigger.name(), id = trigger.id(), "job cancelled, skipping");
        } else {
            Self::run_job(&trigger).await;
        }

        if trigger.is_sequence() {
            scheduler.rearm(&trigger).await;
        }
    }

    /// Execute the job with retries, recording elapsed cost
    async fn run_job(trigger: &Trigger) {
        let name = trigger.name();
        info!(trigger = %name, id = trigger.id(), "firing job");
        let start = Instant::now();

        let mut remaining = trigger.retry_remaining();
        let limit = trigger.retry_limit();
        let mut result = trigger.invoke().await;

        while let Err(cause) = &result {
            trigger.route_failure(cause);
            if remaining == 0 {
                break;
            }
            debug!(trigger = %name, remaining, limit, "job failed, retrying");
            remaining -= 1;
            result = trigger.invoke().await;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        trigger.record_cost(elapsed_ms);
        match result {
            Ok(()) => info!(trigger = %name, cost_ms = elapsed_ms, "job finished"),
            Err(_) => warn!(trigger = %name, cost_ms = elapsed_ms, retries = limit, "job abandoned after retries"),
        }
    }
}
