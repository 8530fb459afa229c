// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Task statistics.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of the task statistics of a [`ThreadPool`](crate::ThreadPool).
///
/// The counters are monotonic and read independently of each other, so a
/// snapshot taken while tasks are running may be slightly inconsistent (e.g.
/// a task may be counted as executed but not yet as failed). Once
/// [`await_termination()`](crate::ThreadPool::await_termination) has
/// returned, `executed == submitted`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of tasks accepted by
    /// [`submit()`](crate::ThreadPool::submit).
    pub submitted: usize,
    /// Number of tasks that a worker ran to completion, successfully or not.
    pub executed: usize,
    /// Number of tasks that panicked or returned a failing
    /// [`TaskOutcome`](crate::TaskOutcome).
    pub failed: usize,
}

/// Monotonic task counters, shared between the pool and its workers.
///
/// These counters are never used to coordinate threads: the queue and the
/// shutdown flag are the only coordination state.
#[derive(Default)]
pub struct Counters {
    submitted: CachePadded<AtomicUsize>,
    executed: CachePadded<AtomicUsize>,
    failed: CachePadded<AtomicUsize>,
}

impl Counters {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that a task ran, and whether it failed.
    pub fn record_executed(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.executed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> PoolStats {
        // Load `executed` first: with the release ordering above, every failure
        // counted in it is then visible.
        let executed = self.executed.load(Ordering::Acquire);
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed,
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
