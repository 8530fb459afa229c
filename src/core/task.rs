// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Units of work executed by the pool.

use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of a task, inspected by the worker thread that ran it.
///
/// Tasks are fire-and-forget: the outcome never reaches the submitter. A
/// failing outcome is reported (logged and counted in
/// [`PoolStats::failed`](crate::PoolStats::failed)) exactly like a panicking
/// task, and the worker moves on to the next task.
///
/// ```
/// # use fixpool::ThreadPool;
/// let pool = ThreadPool::new(1).unwrap();
/// pool.submit(|| println!("infallible task")).unwrap();
/// pool.submit(|| "not a number".parse::<u32>()).unwrap();
/// pool.shutdown();
/// pool.await_termination();
///
/// assert_eq!(pool.stats().executed, 2);
/// assert_eq!(pool.stats().failed, 1);
/// ```
pub trait TaskOutcome {
    /// Returns a description of the failure, or [`None`] if the task
    /// succeeded.
    fn failure(self) -> Option<String>;
}

impl TaskOutcome for () {
    fn failure(self) -> Option<String> {
        None
    }
}

impl<T, E: Display> TaskOutcome for Result<T, E> {
    fn failure(self) -> Option<String> {
        self.err().map(|e| e.to_string())
    }
}

/// A type-erased task, owned by the queue until a worker picks it up.
pub struct Task {
    func: Box<dyn FnOnce() -> Option<String> + Send + 'static>,
}

impl Task {
    /// Wraps the given function into a task.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        Self {
            func: Box::new(move || f().failure()),
        }
    }

    /// Runs this task to completion, catching any panic. Returns a
    /// description of the failure if the task panicked or returned a failing
    /// outcome.
    pub fn run(self) -> Result<(), TaskFailure> {
        match catch_unwind(AssertUnwindSafe(self.func)) {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(TaskFailure::Error(message)),
            Err(payload) => Err(TaskFailure::Panic(panic_message(&*payload))),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Failure of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The task panicked with the given message.
    Panic(String),
    /// The task returned a failing [`TaskOutcome`].
    Error(String),
}

impl Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFailure::Panic(message) => write!(f, "task panicked: {message}"),
            TaskFailure::Error(message) => write!(f, "task failed: {message}"),
        }
    }
}

/// Extracts a message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
