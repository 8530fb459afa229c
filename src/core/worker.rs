// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Worker threads: wait for a task, run it, repeat until shutdown.

use super::sync::SharedContext;
use super::task::Task;
use super::thread_pool::CpuPinningPolicy;
use crate::error::Result;
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use crate::error::Error;
use crate::macros::{log_debug, log_error};
#[cfg(feature = "log_parallelism")]
use crate::macros::log_info;
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use crate::macros::log_warn;
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::sync::Arc;

/// Context object owned by a worker thread.
pub struct WorkerContext {
    /// Thread index.
    id: usize,
    /// Context shared with the pool and the other workers.
    shared: Arc<SharedContext>,
    /// Number of tasks executed by this thread.
    #[cfg(feature = "log_parallelism")]
    executed: usize,
    /// Number of tasks that failed on this thread.
    #[cfg(feature = "log_parallelism")]
    failed: usize,
}

impl WorkerContext {
    pub fn new(id: usize, shared: Arc<SharedContext>) -> Self {
        Self {
            id,
            shared,
            #[cfg(feature = "log_parallelism")]
            executed: 0,
            #[cfg(feature = "log_parallelism")]
            failed: 0,
        }
    }

    /// Main function run by this thread. Returns once the pool is shut down
    /// and the queue is empty.
    pub fn run(&mut self) {
        log_debug!("[thread {}] Started", self.id);
        while let Some(task) = self.next_task() {
            self.execute(task);
        }
        log_debug!("[thread {}] Pool is shut down and queue is empty, exiting", self.id);

        #[cfg(feature = "log_parallelism")]
        log_info!(
            "[thread {}] Executed {} task(s), {} failed",
            self.id,
            self.executed,
            self.failed
        );
    }

    /// Waits until a task is available and dequeues it, or returns [`None`]
    /// if the pool is shut down and there is nothing left to run.
    ///
    /// The lock is released when this function returns, so that the task runs
    /// without blocking submitters and other workers.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.shared.state.wait_while(|state| state.is_idle());
        // Either the queue is non-empty, or the pool is shut down. In the
        // latter case, queued tasks are still drained before exiting.
        let task = state.queue.pop();
        debug_assert!(task.is_some() || state.shutdown);
        task
    }

    /// Runs the given task, reporting its failure if any. A failing task never
    /// takes the worker down.
    fn execute(&mut self, task: Task) {
        let result = task.run();
        if let Err(_failure) = &result {
            log_error!("[thread {}] {_failure}", self.id);
        }
        self.shared.counters.record_executed(result.is_err());

        #[cfg(feature = "log_parallelism")]
        {
            self.executed += 1;
            if result.is_err() {
                self.failed += 1;
            }
        }
    }
}

/// Pins the current thread to a CPU according to the given policy. Worker
/// thread `id` goes to CPU `id % num_cpus`.
///
/// Fails only with [`CpuPinningPolicy::Always`]. On platforms where pinning
/// isn't implemented, the policy is validated when building the pool instead.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
pub fn pin_current_thread(id: usize, num_cpus: usize, policy: CpuPinningPolicy) -> Result<()> {
    let cpu = id % num_cpus;
    let pin = || -> nix::Result<()> {
        let mut cpu_set = CpuSet::new();
        cpu_set.set(cpu)?;
        sched_setaffinity(Pid::from_raw(0), &cpu_set)
    };
    match policy {
        CpuPinningPolicy::No => Ok(()),
        CpuPinningPolicy::IfSupported => {
            match pin() {
                Ok(()) => log_debug!("Pinned thread #{id} to CPU #{cpu}"),
                Err(_e) => log_warn!("Failed to set CPU affinity for thread #{id}: {_e}"),
            }
            Ok(())
        }
        CpuPinningPolicy::Always => match pin() {
            Ok(()) => {
                log_debug!("Pinned thread #{id} to CPU #{cpu}");
                Ok(())
            }
            Err(e) => Err(Error::CpuPinning {
                id,
                cpu,
                reason: e.to_string(),
            }),
        },
    }
}

#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
pub fn pin_current_thread(_id: usize, _num_cpus: usize, _policy: CpuPinningPolicy) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    fn shared_with_tasks(tasks: impl IntoIterator<Item = Task>) -> Arc<SharedContext> {
        let shared = Arc::new(SharedContext::new());
        let mut state = shared.state.lock();
        for task in tasks {
            state.queue.push(task);
            shared.counters.record_submitted();
        }
        drop(state);
        shared
    }

    #[test]
    fn test_worker_drains_queue_after_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = shared_with_tasks((0..10).map(|i| {
            let log = log.clone();
            Task::new(move || log.lock().unwrap().push(i))
        }));
        shared.shutdown();

        WorkerContext::new(0, shared.clone()).run();

        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert!(shared.state.lock().queue.is_empty());
        assert_eq!(shared.counters.snapshot().executed, 10);
    }

    #[test]
    fn test_worker_survives_failing_tasks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = shared_with_tasks((0..6).map(|i| {
            let log = log.clone();
            Task::new(move || -> std::result::Result<(), String> {
                match i {
                    2 => panic!("task {i} panicked"),
                    4 => Err(format!("task {i} failed")),
                    _ => {
                        log.lock().unwrap().push(i);
                        Ok(())
                    }
                }
            })
        }));
        shared.shutdown();

        WorkerContext::new(0, shared.clone()).run();

        assert_eq!(*log.lock().unwrap(), [0, 1, 3, 5]);
        let stats = shared.counters.snapshot();
        assert_eq!(stats.executed, 6);
        assert_eq!(stats.failed, 2);
    }

    #[test]
    fn test_idle_worker_exits_on_shutdown() {
        let shared = Arc::new(SharedContext::new());
        let worker = std::thread::spawn({
            let shared = shared.clone();
            move || WorkerContext::new(0, shared).run()
        });

        std::thread::sleep(std::time::Duration::from_millis(10));
        shared.shutdown();
        worker.join().unwrap();
    }

    #[test]
    fn test_worker_wakes_up_on_submission() {
        let shared = Arc::new(SharedContext::new());
        let (sender, receiver) = std::sync::mpsc::channel();
        let worker = std::thread::spawn({
            let shared = shared.clone();
            move || WorkerContext::new(0, shared).run()
        });

        std::thread::sleep(std::time::Duration::from_millis(10));
        shared
            .state
            .lock()
            .queue
            .push(Task::new(move || sender.send(42).unwrap()));
        shared.state.notify_one();

        assert_eq!(receiver.recv().unwrap(), 42);
        shared.shutdown();
        worker.join().unwrap();
    }

    #[test]
    fn test_pin_policy_no() {
        assert!(pin_current_thread(0, 1, CpuPinningPolicy::No).is_ok());
    }
}
