// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A fixed-size thread pool executing fire-and-forget tasks.

use super::stats::PoolStats;
use super::sync::SharedContext;
use super::task::{Task, TaskOutcome};
use super::worker::{pin_current_thread, WorkerContext};
use crate::error::{Error, Result};
use crate::macros::{log_debug, log_error};
use std::convert::TryFrom;
use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};

/// Number of threads to spawn in a thread pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Spawn the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Spawn the given number of threads.
    Count(NonZeroUsize),
}

impl ThreadCount {
    /// Resolves the number of threads to spawn.
    pub fn count(self) -> Result<NonZeroUsize> {
        match self {
            ThreadCount::AvailableParallelism => {
                std::thread::available_parallelism().map_err(Error::AvailableParallelism)
            }
            ThreadCount::Count(count) => Ok(count),
        }
    }
}

impl TryFrom<usize> for ThreadCount {
    type Error = <NonZeroUsize as TryFrom<usize>>::Error;

    fn try_from(thread_count: usize) -> std::result::Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(thread_count)?;
        Ok(ThreadCount::Count(count))
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. If CPU pinning isn't supported on this
    /// platform (or not implemented), or fails, building a thread pool returns
    /// an error.
    Always,
}

/// A builder for [`ThreadPool`].
#[derive(Clone, Debug)]
pub struct ThreadPoolBuilder {
    /// Number of worker threads to spawn in the pool.
    pub num_threads: ThreadCount,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
    /// Prefix of the worker thread names. Worker threads are named
    /// `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size of the worker threads, or [`None`] for the platform default.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self {
            num_threads: ThreadCount::AvailableParallelism,
            cpu_pinning: CpuPinningPolicy::No,
            thread_name_prefix: "fixpool-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolBuilder {
    /// Spawns a thread pool.
    ///
    /// ```
    /// # use fixpool::{CpuPinningPolicy, ThreadCount, ThreadPoolBuilder};
    /// # use std::sync::atomic::{AtomicUsize, Ordering};
    /// # use std::sync::Arc;
    /// let thread_pool = ThreadPoolBuilder {
    ///     num_threads: ThreadCount::try_from(4).unwrap(),
    ///     cpu_pinning: CpuPinningPolicy::No,
    ///     thread_name_prefix: "my-worker".to_string(),
    ///     stack_size: None,
    /// }
    /// .build()
    /// .unwrap();
    ///
    /// let sum = Arc::new(AtomicUsize::new(0));
    /// for i in 1..=10 {
    ///     let sum = sum.clone();
    ///     thread_pool
    ///         .submit(move || {
    ///             sum.fetch_add(i, Ordering::Relaxed);
    ///         })
    ///         .unwrap();
    /// }
    ///
    /// thread_pool.shutdown();
    /// thread_pool.await_termination();
    /// assert_eq!(sum.load(Ordering::Relaxed), 5 * 11);
    /// ```
    pub fn build(&self) -> Result<ThreadPool> {
        ThreadPool::with_builder(self)
    }
}

/// A pool of a fixed number of worker threads, executing tasks from a shared
/// FIFO queue.
///
/// Tasks are submitted with [`submit()`](Self::submit) and run in submission
/// order by the first available worker. They are fire-and-forget: nothing is
/// returned to the submitter, and a task that panics or fails is reported by
/// the worker (see [`TaskOutcome`]) without affecting the pool.
///
/// The queue is unbounded: submitting never blocks, and the queue grows
/// without limit if tasks are submitted faster than they run.
///
/// A [`ThreadPool`] is [`Sync`], so it can be shared (e.g. in an [`Arc`])
/// between several submitting threads.
///
/// Dropping the pool shuts it down gracefully: queued tasks still run, and the
/// worker threads are joined.
pub struct ThreadPool {
    /// Number of worker threads spawned in the pool.
    num_threads: NonZeroUsize,
    /// Context shared with the worker threads.
    shared: Arc<SharedContext>,
    /// Handles to the worker threads that haven't been joined yet.
    threads: Mutex<Vec<WorkerThreadHandle>>,
    /// Identifiers of the worker threads, readable without locking `threads`.
    worker_ids: Box<[ThreadId]>,
}

/// Handle to a worker thread in a thread pool.
struct WorkerThreadHandle {
    /// Thread index.
    id: usize,
    /// Thread handle object.
    handle: JoinHandle<()>,
}

impl ThreadPool {
    /// Creates a thread pool with the given number of worker threads, using
    /// the default settings of [`ThreadPoolBuilder`] otherwise.
    ///
    /// Fails with [`Error::InvalidThreadCount`] if `capacity` is zero.
    ///
    /// ```
    /// # use fixpool::{Error, ThreadPool};
    /// let thread_pool = ThreadPool::new(2).unwrap();
    /// assert_eq!(thread_pool.num_threads().get(), 2);
    ///
    /// assert!(matches!(ThreadPool::new(0), Err(Error::InvalidThreadCount)));
    /// ```
    pub fn new(capacity: usize) -> Result<Self> {
        let num_threads = ThreadCount::try_from(capacity).map_err(|_| Error::InvalidThreadCount)?;
        ThreadPoolBuilder {
            num_threads,
            ..ThreadPoolBuilder::default()
        }
        .build()
    }

    /// Creates a new thread pool using the given parameters.
    fn with_builder(builder: &ThreadPoolBuilder) -> Result<Self> {
        let num_threads = builder.num_threads.count()?;

        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        match builder.cpu_pinning {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => {
                crate::macros::log_warn!(
                    "Pinning threads to CPUs is not implemented on this platform."
                )
            }
            CpuPinningPolicy::Always => return Err(Error::CpuPinningUnsupported),
        }
        let num_cpus = match builder.cpu_pinning {
            CpuPinningPolicy::No => 1,
            _ => std::thread::available_parallelism()
                .map_err(Error::AvailableParallelism)?
                .get(),
        };

        let mut pool = ThreadPool {
            num_threads,
            shared: Arc::new(SharedContext::new()),
            threads: Mutex::new(Vec::with_capacity(num_threads.get())),
            worker_ids: Box::new([]),
        };

        // Each worker reports whether it could be set up (i.e. pinned to a CPU)
        // before entering its loop.
        let (ready_sender, ready_receiver) = mpsc::channel();
        let mut worker_ids = Vec::with_capacity(num_threads.get());
        for id in 0..num_threads.get() {
            let mut context = WorkerContext::new(id, pool.shared.clone());
            let ready_sender = ready_sender.clone();
            let cpu_pinning = builder.cpu_pinning;

            let mut thread_builder =
                std::thread::Builder::new().name(format!("{}-{id}", builder.thread_name_prefix));
            if let Some(stack_size) = builder.stack_size {
                thread_builder = thread_builder.stack_size(stack_size);
            }

            let spawned = thread_builder.spawn(move || {
                let setup = pin_current_thread(id, num_cpus, cpu_pinning);
                let ready = setup.is_ok();
                // The receiver outlives the setup phase, unless the pool
                // construction already failed.
                let _ = ready_sender.send(setup);
                if ready {
                    context.run();
                }
            });
            match spawned {
                Ok(handle) => {
                    worker_ids.push(handle.thread().id());
                    pool.lock_threads().push(WorkerThreadHandle { id, handle });
                }
                Err(source) => {
                    log_error!("[main thread] Failed to spawn thread {id}: {source}");
                    // Dropping the pool shuts down and joins the threads spawned so far.
                    return Err(Error::Spawn { id, source });
                }
            }
        }
        drop(ready_sender);
        pool.worker_ids = worker_ids.into_boxed_slice();

        let mut setup_error = None;
        for _ in 0..num_threads.get() {
            match ready_receiver.recv() {
                Ok(Ok(())) => (),
                Ok(Err(e)) => {
                    log_error!("[main thread] Failed to set up a worker thread: {e}");
                    setup_error.get_or_insert(e);
                }
                // A worker thread dropped its sender without reporting.
                Err(_) => break,
            }
        }
        if let Some(e) = setup_error {
            return Err(e);
        }

        log_debug!("[main thread] Spawned {num_threads} threads");
        Ok(pool)
    }

    /// Returns the number of worker threads that have been spawned in this
    /// thread pool.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Submits a task for execution by one of the worker threads.
    ///
    /// The task is appended to the queue and one idle worker (if any) is woken
    /// up. This doesn't wait for the task to run.
    ///
    /// The task may return `()` or a [`Result`](std::result::Result): an
    /// [`Err`] outcome is reported like a panic, see [`TaskOutcome`].
    ///
    /// Fails with [`Error::Rejected`] if [`shutdown()`](Self::shutdown) has
    /// been called. In that case the task is dropped without running.
    pub fn submit<F, R>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        let task = Task::new(task);

        let mut state = self.shared.state.lock();
        if state.shutdown {
            drop(state);
            log_debug!("[main thread] Rejected a task submitted after shutdown");
            return Err(Error::Rejected);
        }
        state.queue.push(task);
        self.shared.counters.record_submitted();
        drop(state);

        // Exactly one task was enqueued, so exactly one worker needs to wake up.
        self.shared.state.notify_one();
        Ok(())
    }

    /// Shuts the pool down: no new task is accepted, and the worker threads
    /// exit once the queue is empty.
    ///
    /// Tasks that were already submitted still run. This doesn't wait for the
    /// worker threads to exit, see
    /// [`await_termination()`](Self::await_termination). Calling this again
    /// has no effect.
    pub fn shutdown(&self) {
        if self.shared.shutdown() {
            log_debug!("[main thread] Shut down the pool, notified all threads");
        }
    }

    /// Whether [`shutdown()`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Returns the number of tasks waiting in the queue, not counting those
    /// currently running.
    pub fn queued_tasks(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Returns statistics about the tasks submitted to this pool.
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    /// Blocks until all the worker threads have exited.
    ///
    /// The workers only exit once the pool is shut down and all the submitted
    /// tasks have run, so this blocks indefinitely unless
    /// [`shutdown()`](Self::shutdown) is called (possibly by another thread).
    ///
    /// This can be called several times and from several threads: every call
    /// returns once all the workers have been joined.
    ///
    /// # Panics
    ///
    /// Panics if called from a task running on this pool, as the calling
    /// worker would wait for itself.
    pub fn await_termination(&self) {
        // Checked before locking: another caller may hold the lock while
        // joining this very worker.
        if self.is_worker_thread() {
            panic!("await_termination() called from a worker thread of the same pool");
        }

        // Holding the lock while joining makes concurrent callers wait until
        // the joins have completed.
        let mut threads = self.lock_threads();

        if !threads.is_empty() {
            log_debug!("[main thread] Joining threads in the pool...");
        }
        for t in threads.drain(..) {
            let _id = t.id;
            let result = t.handle.join();
            match result {
                Ok(_) => log_debug!("[main thread] Thread {_id} joined with result: {result:?}"),
                Err(_) => log_error!("[main thread] Thread {_id} joined with result: {result:?}"),
            }
        }
    }

    fn lock_threads(&self) -> std::sync::MutexGuard<'_, Vec<WorkerThreadHandle>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the current thread is one of the worker threads of this pool.
    fn is_worker_thread(&self) -> bool {
        self.worker_ids.contains(&std::thread::current().id())
    }
}

impl Drop for ThreadPool {
    /// Shuts down the pool and joins all the threads in the pool.
    fn drop(&mut self) {
        self.shutdown();
        if self.is_worker_thread() {
            // The last reference to the pool was dropped by one of its own
            // tasks. The workers exit on their own once the queue is drained.
            log_debug!("[main thread] Pool dropped from a worker thread, detaching threads");
            self.lock_threads().clear();
            return;
        }
        self.await_termination();
        log_debug!("[main thread] Joined threads.");
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads)
            .field("is_shutdown", &self.is_shutdown())
            .field("queued_tasks", &self.queued_tasks())
            .finish_non_exhaustive()
    }
}
