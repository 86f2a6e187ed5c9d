//! Delay-ordered wait structure
//!
//! Holds pending triggers ordered by due time, ties broken by occurrence
//! id. A single consumer (the dispatcher) blocks on [`DelayQueue::take`]
//! until the earliest entry is due; producers push from any task.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::trigger::Trigger;

/// Heap entry; reversed ordering so the earliest due time sits on top,
/// equal due times dequeue in id (insertion) order
struct Pending {
    trigger: Trigger,
}

impl Eq for Pending {}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.trigger.execute_time() == other.trigger.execute_time() && self.trigger.id() == other.trigger.id()
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .trigger
            .execute_time()
            .cmp(&self.trigger.execute_time())
            .then_with(|| other.trigger.id().cmp(&self.trigger.id()))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Blocking, time-ordered trigger queue
pub(crate) struct DelayQueue {
    heap: Mutex<BinaryHeap<Pending>>,
    notify: Notify,
}

impl DelayQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    /// Insert a trigger and wake the consumer if it is waiting
    pub(crate) async fn push(&self, trigger: Trigger) {
        {
            let mut heap = self.heap.lock().await;
            heap.push(Pending { trigger });
        }
        // single consumer; a stored permit covers the push-while-computing race
        self.notify.notify_one();
    }

    /// Block until the earliest-due trigger is due, then remove and return it
    ///
    /// A trigger whose due time is already in the past returns immediately.
    pub(crate) async fn take(&self) -> Trigger {
        loop {
            let notified = self.notify.notified();

            let until_due = {
                let mut heap = self.heap.lock().await;
                let now = Local::now();
                let head_due = heap.peek().map(|pending| pending.trigger.execute_time());
                match head_due {
                    Some(due) if due <= now => {
                        if let Some(pending) = heap.pop() {
                            return pending.trigger;
                        }
                        continue;
                    }
                    Some(due) => Some(due - now),
                    None => None,
                }
            };

            match until_due {
                Some(delay) => {
                    let delay = delay.to_std().unwrap_or(Duration::ZERO);
                    debug!(?delay, "DelayQueue::take: head not due, waiting");
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    debug!("DelayQueue::take: empty, waiting for a push");
                    notified.await;
                }
            }
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    /// Remove and return every pending trigger in due-time order
    pub(crate) async fn drain(&self) -> Vec<Trigger> {
        let mut heap = self.heap.lock().await;
        let mut remaining = Vec::with_capacity(heap.len());
        while let Some(pending) = heap.pop() {
            remaining.push(pending.trigger);
        }
        remaining
    }
}
