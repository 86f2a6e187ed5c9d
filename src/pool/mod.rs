//! Worker pools executing firing occurrences
//!
//! A pool is a fixed set of worker tasks draining a bounded submission
//! queue. Submission never blocks: a full (or shut down) pool hands the
//! task back to the submitter, which runs it itself (caller-runs
//! backpressure). Each task runs under its own spawn so a panicking job
//! takes down neither the worker nor the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::runner::TaskRunner;
use crate::scheduler::PoolConfig;

/// A pool of workers executing firing occurrences
#[async_trait]
pub trait WorkerPool: Send + Sync {
    fn name(&self) -> &str;

    /// Tasks queued and not yet picked up by a worker
    async fn depth(&self) -> usize;

    /// Workers currently running a task
    fn active(&self) -> usize;

    /// Queue a task for execution; hands the task back if the pool
    /// cannot accept it
    async fn submit(&self, task: TaskRunner) -> Result<(), TaskRunner>;

    /// Stop accepting submissions; already-queued tasks still drain
    async fn shutdown(&self);
}

/// Construct the pool implementation selected by configuration
///
/// Unknown implementation names log a warning and fall back to the
/// built-in fixed pool.
pub(crate) fn build(name: &str, config: &PoolConfig, workers: usize) -> Box<dyn WorkerPool> {
    match config.implementation.as_str() {
        "fixed" => {}
        other => warn!(pool = name, implementation = %other, "unknown worker pool implementation, using fixed"),
    }
    Box::new(FixedWorkerPool::start(name, workers, config.queue_capacity))
}

/// Built-in pool: `workers` tasks sharing one bounded queue
pub struct FixedWorkerPool {
    name: String,
    /// Taken on shutdown; dropping the sender closes the queue
    tx: Mutex<Option<mpsc::Sender<TaskRunner>>>,
    active: Arc<AtomicUsize>,
}

impl FixedWorkerPool {
    /// Spawn the worker tasks; must be called within a tokio runtime
    pub fn start(name: &str, workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<TaskRunner>(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));

        for index in 0..workers {
            tokio::spawn(worker_loop(
                name.to_string(),
                index,
                Arc::clone(&rx),
                Arc::clone(&active),
            ));
        }

        info!(pool = name, workers, queue_capacity, "worker pool started");
        Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            active,
        }
    }
}

#[async_trait]
impl WorkerPool for FixedWorkerPool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn depth(&self) -> usize {
        self.tx
            .lock()
            .await
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn submit(&self, task: TaskRunner) -> Result<(), TaskRunner> {
        match self.tx.lock().await.as_ref() {
            Some(tx) => match tx.try_send(task) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(task)) | Err(mpsc::error::TrySendError::Closed(task)) => Err(task),
            },
            None => Err(task),
        }
    }

    async fn shutdown(&self) {
        let depth = self.depth().await;
        info!(
            pool = %self.name,
            depth = depth,
            active = self.active(),
            "shutting down worker pool"
        );
        // closing the queue lets workers finish what is queued, then exit
        self.tx.lock().await.take();
        info!(pool = %self.name, "worker pool shut down");
    }
}

/// One worker: pull a task, run it isolated, repeat until the queue closes
async fn worker_loop(pool: String, index: usize, rx: Arc<Mutex<mpsc::Receiver<TaskRunner>>>, active: Arc<AtomicUsize>) {
    loop {
        // idle workers queue up on the lock; the holder releases it as soon
        // as it has a task in hand
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else { break };

        active.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = tokio::spawn(task.run()).await {
            error!(pool = %pool, worker = index, error = %e, "task panicked");
        }
        active.fetch_sub(1, Ordering::SeqCst);
    }
    debug!(pool = %pool, worker = index, "worker exited");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Local;

    use super::*;
    use crate::scheduler::Scheduler;
    use crate::trigger::{factory, job};

    fn counting_task(scheduler: &Scheduler, name: &str, calls: &Arc<AtomicUsize>) -> TaskRunner {
        let calls = Arc::clone(calls);
        let trigger = factory::once(
            name,
            Local::now(),
            job(move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .expect("valid trigger");
        TaskRunner::new(trigger, scheduler.clone())
    }

    #[tokio::test]
    async fn test_submitted_task_executes() {
        let scheduler = Scheduler::with_defaults();
        let pool = FixedWorkerPool::start("test", 2, 16);
        let calls = Arc::new(AtomicUsize::new(0));

        pool.submit(counting_task(&scheduler, "t", &calls))
            .await
            .ok()
            .expect("pool accepts the task");
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pool.shutdown().await;
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_pool_rejects_submissions() {
        let scheduler = Scheduler::with_defaults();
        let pool = FixedWorkerPool::start("test", 1, 16);
        pool.shutdown().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let rejected = pool.submit(counting_task(&scheduler, "t", &calls)).await;

        assert!(rejected.is_err());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_hands_task_back() {
        let scheduler = Scheduler::with_defaults();
        let pool = FixedWorkerPool::start("test", 1, 1);

        // occupy the single worker
        let blocker = factory::once(
            "blocker",
            Local::now(),
            job(|_| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            }),
        )
        .expect("valid trigger");
        pool.submit(TaskRunner::new(blocker, scheduler.clone()))
            .await
            .ok()
            .expect("first task accepted");
        tokio::time::sleep(Duration::from_millis(100)).await;

        // fill the queue, then overflow it
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(pool.submit(counting_task(&scheduler, "queued", &calls)).await.is_ok());
        assert!(pool.submit(counting_task(&scheduler, "overflow", &calls)).await.is_err());

        pool.shutdown().await;
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let scheduler = Scheduler::with_defaults();
        let pool = FixedWorkerPool::start("test", 1, 16);

        let panicking = factory::once("panics", Local::now(), job(|_| async { panic!("job panicked") }))
            .expect("valid trigger");
        pool.submit(TaskRunner::new(panicking, scheduler.clone()))
            .await
            .ok()
            .expect("pool accepts the task");
        tokio::time::sleep(Duration::from_millis(100)).await;

        // the worker survives and keeps executing
        let calls = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_task(&scheduler, "after", &calls))
            .await
            .ok()
            .expect("pool still accepts tasks");
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pool.shutdown().await;
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_falls_back_on_unknown_implementation() {
        let config = PoolConfig {
            implementation: "gpu".to_string(),
            ..Default::default()
        };
        let pool = build("normal", &config, 2);
        assert_eq!(pool.name(), "normal");
        pool.shutdown().await;
    }
}
