// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors returned by the thread pool.

/// Result type returned by the fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned when building a [`ThreadPool`](crate::ThreadPool) or
/// submitting tasks to it.
///
/// Failures of the tasks themselves are never returned to the submitter: they
/// are reported by the worker thread that ran the task.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pool has been shut down and no longer accepts tasks. The rejected
    /// task was dropped without running.
    #[error("the thread pool has been shut down and no longer accepts tasks")]
    Rejected,

    /// A thread pool needs at least one worker thread.
    #[error("invalid thread count: a thread pool needs at least one worker thread")]
    InvalidThreadCount,

    /// Resolving [`ThreadCount::AvailableParallelism`](crate::ThreadCount)
    /// failed.
    #[error("failed to query the available parallelism: {0}")]
    AvailableParallelism(#[source] std::io::Error),

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread #{id}: {source}")]
    Spawn {
        /// Index of the worker thread.
        id: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// [`CpuPinningPolicy::Always`](crate::CpuPinningPolicy::Always) was
    /// requested on a platform where pinning isn't implemented.
    #[error("pinning threads to CPUs is not implemented on this platform")]
    CpuPinningUnsupported,

    /// [`CpuPinningPolicy::Always`](crate::CpuPinningPolicy::Always) was
    /// requested and a worker thread couldn't be pinned.
    #[error("failed to pin worker thread #{id} to CPU #{cpu}: {reason}")]
    CpuPinning {
        /// Index of the worker thread.
        id: usize,
        /// Index of the CPU.
        cpu: usize,
        /// Description of the failure reported by the operating system.
        reason: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::Rejected.to_string(),
            "the thread pool has been shut down and no longer accepts tasks"
        );
        assert_eq!(
            Error::CpuPinning {
                id: 3,
                cpu: 1,
                reason: "EINVAL".to_string(),
            }
            .to_string(),
            "failed to pin worker thread #3 to CPU #1: EINVAL"
        );
    }

    #[test]
    fn test_spawn_error_source() {
        use std::error::Error as _;

        let error = Error::Spawn {
            id: 0,
            source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no memory"),
        };
        assert!(error.source().is_some());
        assert_eq!(error.to_string(), "failed to spawn worker thread #0: no memory");
    }
}
