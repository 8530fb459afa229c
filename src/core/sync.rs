// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Synchronization primitives shared between the pool and its workers.

use super::queue::TaskQueue;
use super::stats::Counters;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// An ergonomic wrapper around a [`Mutex`]-[`Condvar`] pair.
///
/// The lock is never held while running user code, so a poisoned lock can
/// only come from a bug in this crate. Rather than cascading the panic to all
/// the threads of the pool, the guard is recovered from the [`PoisonError`].
pub struct Monitor<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

impl<T> Monitor<T> {
    /// Creates a new monitor protecting the given value.
    pub fn new(t: T) -> Self {
        Self {
            mutex: Mutex::new(t),
            condvar: Condvar::new(),
        }
    }

    /// Locks the protected value.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes up one thread waiting on this monitor.
    pub fn notify_one(&self) {
        self.condvar.notify_one();
    }

    /// Wakes up all the threads waiting on this monitor.
    pub fn notify_all(&self) {
        self.condvar.notify_all();
    }

    /// Waits until the predicate is false on the protected value.
    ///
    /// This returns a [`MutexGuard`], allowing to further inspect or modify the
    /// value. Spurious wake-ups re-evaluate the predicate.
    pub fn wait_while(&self, predicate: impl FnMut(&mut T) -> bool) -> MutexGuard<'_, T> {
        self.condvar
            .wait_while(self.lock(), predicate)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mutable state of a pool, protected by a single lock.
pub struct PoolState {
    /// Tasks submitted but not yet picked up by a worker.
    pub queue: TaskQueue,
    /// Whether the pool has been shut down. Never reset once set.
    pub shutdown: bool,
}

impl PoolState {
    /// Whether a worker waiting for work needs to keep waiting.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.shutdown
    }
}

/// Context shared between the pool handle and the worker threads.
pub struct SharedContext {
    /// The task queue and the shutdown flag, with the condition variable that
    /// workers wait on.
    pub state: Monitor<PoolState>,
    /// Task statistics.
    pub counters: Counters,
}

impl SharedContext {
    /// Creates the context of a running pool with an empty queue.
    pub fn new() -> Self {
        Self {
            state: Monitor::new(PoolState {
                queue: TaskQueue::new(),
                shutdown: false,
            }),
            counters: Counters::default(),
        }
    }

    /// Sets the shutdown flag and wakes up all the waiting workers, so that
    /// idle workers re-check the flag. Returns whether this call was the one
    /// that shut the pool down.
    pub fn shutdown(&self) -> bool {
        let mut state = self.state.lock();
        let first = !state.shutdown;
        state.shutdown = true;
        drop(state);

        self.state.notify_all();
        first
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn monitor_wakes_up_waiter() {
        let monitor = Arc::new(Monitor::new(0));
        let barrier = Arc::new(Barrier::new(2));

        let waiter = std::thread::spawn({
            let monitor = monitor.clone();
            let barrier = barrier.clone();
            move || {
                barrier.wait();
                *monitor.wait_while(|value| *value == 0)
            }
        });

        barrier.wait();
        std::thread::sleep(Duration::from_millis(10));
        *monitor.lock() = 42;
        monitor.notify_one();

        assert_eq!(waiter.join().unwrap(), 42);
    }

    #[test]
    fn monitor_notify_all_wakes_up_every_waiter() {
        const NUM_THREADS: usize = 4;

        let monitor = Arc::new(Monitor::new(false));
        let waiters = (0..NUM_THREADS)
            .map(|_| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    let _guard = monitor.wait_while(|ready| !*ready);
                })
            })
            .collect::<Vec<_>>();

        std::thread::sleep(Duration::from_millis(10));
        *monitor.lock() = true;
        monitor.notify_all();

        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    #[test]
    fn monitor_recovers_from_poison() {
        let monitor = Arc::new(Monitor::new(1));
        let result = std::thread::spawn({
            let monitor = monitor.clone();
            move || {
                let _guard = monitor.lock();
                panic!("poisoning the lock");
            }
        })
        .join();
        assert!(result.is_err());

        *monitor.lock() += 1;
        assert_eq!(*monitor.lock(), 2);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let context = SharedContext::new();
        assert!(!context.state.lock().shutdown);
        assert!(context.state.lock().is_idle());

        assert!(context.shutdown());
        assert!(!context.shutdown());
        assert!(context.state.lock().shutdown);
        assert!(!context.state.lock().is_idle());
    }
}
