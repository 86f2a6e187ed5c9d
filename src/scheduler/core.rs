//! Scheduler implementation
//!
//! An explicitly constructed object owning the waiting registry, the
//! delay-ordered wait structure, the dispatcher task, and the worker
//! pools. Cheap to clone; a process typically keeps one for its lifetime
//! but nothing enforces that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use super::queue::DelayQueue;
use crate::error::SchedulerError;
use crate::pool::{self, WorkerPool};
use crate::runner::TaskRunner;
use crate::trigger::{Trigger, TriggerShared};

/// Callback invoked once with the still-pending triggers when the
/// dispatcher stops
pub type InterruptListener = Box<dyn Fn(Vec<Trigger>) + Send + Sync>;

/// Registry entry for a pending occurrence
struct WaitingEntry {
    id: i64,
    shared: Arc<TriggerShared>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    queue: DelayQueue,
    /// Name-keyed registry of occurrences currently pending in the queue
    waiting: Mutex<HashMap<String, WaitingEntry>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    interrupt_listener: std::sync::Mutex<Option<InterruptListener>>,
    dispatcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    normal_pool: Box<dyn WorkerPool>,
    slow_pool: Box<dyn WorkerPool>,
}

/// The scheduling and dispatch engine
///
/// Registration (`schedule`), cancellation (`cancel`, `schedule_cancel`)
/// and shutdown are safe to call from any task, concurrently with the
/// dispatcher and with in-flight executions.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Start a scheduler with the given configuration
    ///
    /// Spawns the dispatcher task and the worker pools; must be called
    /// within a tokio runtime.
    pub fn start(config: SchedulerConfig) -> Self {
        let normal_pool = pool::build("normal", &config.normal_pool, config.normal_workers());
        let slow_pool = pool::build("slow", &config.slow_pool, config.slow_workers());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                config,
                queue: DelayQueue::new(),
                waiting: Mutex::new(HashMap::new()),
                running: AtomicBool::new(true),
                shutdown_tx,
                interrupt_listener: std::sync::Mutex::new(None),
                dispatcher: std::sync::Mutex::new(None),
                normal_pool,
                slow_pool,
            }),
        };

        let handle = tokio::spawn(dispatch_loop(scheduler.clone(), shutdown_rx));
        *lock_unpoisoned(&scheduler.inner.dispatcher) = Some(handle);
        info!("scheduler started");
        scheduler
    }

    /// Start a scheduler with default configuration
    pub fn with_defaults() -> Self {
        Self::start(SchedulerConfig::default())
    }

    /// Whether the scheduler still accepts registrations
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Register a trigger
    ///
    /// Returns `Ok(false)` without mutating anything if the scheduler is
    /// stopped. Fails if the trigger has no name or if an occurrence with
    /// the same name is already pending. The registry entry is inserted
    /// before the queue entry so a concurrent duplicate registration
    /// cannot slip between the two.
    pub async fn schedule(&self, trigger: Trigger) -> Result<bool, SchedulerError> {
        if !self.is_running() {
            debug!(trigger = %trigger.name(), "Scheduler::schedule: stopped, rejecting");
            return Ok(false);
        }
        if trigger.name().is_empty() {
            return Err(SchedulerError::MissingName);
        }

        let name = trigger.name().to_string();
        {
            let mut waiting = self.inner.waiting.lock().await;
            if waiting.contains_key(&name) {
                debug!(trigger = %name, "Scheduler::schedule: name already pending");
                return Err(SchedulerError::DuplicateName(name));
            }
            waiting.insert(
                name.clone(),
                WaitingEntry {
                    id: trigger.id(),
                    shared: Arc::clone(trigger.shared()),
                },
            );
        }

        info!(
            trigger = %name,
            id = trigger.id(),
            execute_time = %trigger.execute_time(),
            "schedule trigger"
        );
        self.inner.queue.push(trigger).await;
        Ok(true)
    }

    /// Soft-cancel the pending occurrence registered under `name`
    ///
    /// Sets the cancel flag: the occurrence skips its job body at fire
    /// time and never re-arms. The name stays taken until the dispatcher
    /// dequeues the entry, so an immediate re-registration may still
    /// report a duplicate; use [`Scheduler::schedule_cancel`] to free the
    /// name right away.
    pub async fn cancel(&self, name: &str) -> bool {
        let waiting = self.inner.waiting.lock().await;
        match waiting.get(name) {
            Some(entry) => {
                entry.shared.cancel();
                debug!(trigger = %name, "Scheduler::cancel: marked cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel the pending occurrence under `name` and free the name
    ///
    /// Unlike [`Scheduler::cancel`], a new trigger with the same name can
    /// be registered immediately. The stale queue entry is discarded when
    /// the dispatcher reaches it.
    pub async fn schedule_cancel(&self, name: &str) -> bool {
        let mut waiting = self.inner.waiting.lock().await;
        match waiting.remove(name) {
            Some(entry) => {
                entry.shared.cancel();
                debug!(trigger = %name, "Scheduler::schedule_cancel: cancelled and released name");
                true
            }
            None => false,
        }
    }

    /// Whether an occurrence with this name is currently pending
    pub async fn is_scheduled(&self, name: &str) -> bool {
        self.inner.waiting.lock().await.contains_key(name)
    }

    /// Number of triggers currently pending in the wait structure
    pub async fn pending(&self) -> usize {
        self.inner.queue.len().await
    }

    /// Install the dispatcher interrupt listener
    ///
    /// Invoked exactly once, with every still-pending trigger, when the
    /// dispatcher stops. Failures inside it are caught and logged.
    pub fn set_interrupt_listener<F>(&self, listener: F)
    where
        F: Fn(Vec<Trigger>) + Send + Sync + 'static,
    {
        *lock_unpoisoned(&self.inner.interrupt_listener) = Some(Box::new(listener));
    }

    /// Stop the scheduler
    ///
    /// Rejects further registrations, interrupts the dispatcher (running
    /// the interrupt listener against the still-pending triggers), then
    /// shuts down the worker pools. In-flight executions are not
    /// cancelled.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("Scheduler::shutdown: already stopped");
            return;
        }

        info!("shutting down scheduler");
        let _ = self.inner.shutdown_tx.send(true);

        let handle = lock_unpoisoned(&self.inner.dispatcher).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatcher task failed during shutdown");
            }
        }

        self.inner.normal_pool.shutdown().await;
        self.inner.slow_pool.shutdown().await;
        info!("scheduler shut down");
    }

    /// Compute and register the successor of a fired occurrence
    ///
    /// Shared by the dispatcher (eager re-arming at dequeue) and the task
    /// runner (sequence-mode re-arming after completion). Failures are
    /// logged, never propagated: they must not take down the caller.
    pub(crate) async fn rearm(&self, trigger: &Trigger) {
        let Some(next) = trigger.next_occurrence() else {
            debug!(trigger = %trigger.name(), "no next occurrence, retiring");
            return;
        };

        let name = next.name().to_string();
        let execute_time = next.execute_time();
        match self.schedule(next).await {
            Ok(true) => debug!(trigger = %name, %execute_time, "re-armed next occurrence"),
            Ok(false) => debug!(trigger = %name, "scheduler stopped, dropping next occurrence"),
            Err(e) => warn!(trigger = %name, error = %e, "failed to re-arm next occurrence"),
        }
    }

    /// One dispatcher iteration for a due trigger
    async fn dispatch(&self, trigger: Trigger) {
        let name = trigger.name().to_string();

        // release the name; guard on id so a successor registered after a
        // schedule_cancel of this occurrence is left untouched
        {
            let mut waiting = self.inner.waiting.lock().await;
            if waiting.get(&name).is_some_and(|entry| entry.id == trigger.id()) {
                waiting.remove(&name);
            }
        }

        // eager discipline: arm the successor before the job runs, so
        // successive runs of the same job may overlap
        if !trigger.is_sequence() {
            self.rearm(&trigger).await;
        }

        let cost = trigger.cost_time_ms();
        let pool = if cost > self.inner.config.slow_threshold_ms {
            &self.inner.slow_pool
        } else {
            &self.inner.normal_pool
        };
        debug!(trigger = %name, id = trigger.id(), cost_ms = cost, pool = pool.name(), "dispatching");

        let runner = TaskRunner::new(trigger, self.clone());
        if let Err(runner) = pool.submit(runner).await {
            // caller-runs backpressure: trade dispatcher latency for never
            // dropping a due occurrence
            warn!(trigger = %name, pool = pool.name(), "worker pool rejected task, running on dispatcher");
            if let Err(e) = tokio::spawn(runner.run()).await {
                error!(trigger = %name, error = %e, "task panicked while running on dispatcher");
            }
        }
    }

    /// Terminal path: drain the queue and hand the remainder to the
    /// interrupt listener
    async fn on_interrupt(&self) {
        let remaining = self.inner.queue.drain().await;
        error!(pending = remaining.len(), "dispatcher interrupted, task intake stopped");
        for trigger in &remaining {
            info!(?trigger, "pending at interrupt");
        }

        let listener = lock_unpoisoned(&self.inner.interrupt_listener).take();
        if let Some(listener) = listener {
            info!("running dispatcher interrupt listener");
            listener(remaining);
        }
    }
}

/// The single dispatcher loop
///
/// Only interruption stops it; any other failure is logged and the loop
/// continues.
async fn dispatch_loop(scheduler: Scheduler, mut shutdown_rx: watch::Receiver<bool>) {
    debug!("dispatcher started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                scheduler.on_interrupt().await;
                break;
            }
            trigger = scheduler.inner.queue.take() => {
                scheduler.dispatch(trigger).await;
            }
        }
    }
    debug!("dispatcher stopped");
}

/// Recover the guard from a poisoned mutex; these locks only guard slot
/// assignment, so the stored value is still coherent
fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
