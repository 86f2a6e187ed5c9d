//! Process-wide monotonic trigger id source
//!
//! Every trigger occurrence gets a fresh id from here. Ids strictly
//! increase for the lifetime of the process and double as the FIFO
//! tie-break when two occurrences share a due time.

use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// Hand out the next occurrence id
///
/// Safe under unbounded concurrent calls; never fails. Wraparound at the
/// i64 boundary is a theoretical non-goal.
pub fn next_id() -> i64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}
