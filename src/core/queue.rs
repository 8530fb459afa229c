// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Unbounded FIFO queue of pending tasks.

use super::task::Task;
use std::collections::VecDeque;

/// An unbounded FIFO of tasks waiting for a worker.
///
/// There is no backpressure: under sustained overload the queue grows without
/// limit. Synchronization is the responsibility of the owner (see
/// [`PoolState`](super::sync::PoolState)).
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task at the back of the queue.
    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Removes the earliest submitted task still in the queue.
    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Number of tasks waiting in the queue.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
