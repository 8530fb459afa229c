// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to run a random workload on a thread pool.

use clap::{Parser, ValueEnum};
use fixpool::{CpuPinningPolicy, ThreadCount, ThreadPoolBuilder};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

fn main() -> fixpool::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let thread_pool = ThreadPoolBuilder {
        num_threads: match cli.num_threads {
            Some(num_threads) => ThreadCount::Count(num_threads),
            None => ThreadCount::AvailableParallelism,
        },
        cpu_pinning: match cli.cpu_pinning {
            CpuPinningCli::No => CpuPinningPolicy::No,
            CpuPinningCli::IfSupported => CpuPinningPolicy::IfSupported,
            CpuPinningCli::Always => CpuPinningPolicy::Always,
        },
        ..ThreadPoolBuilder::default()
    }
    .build()?;

    let workload = generate_workload(&cli);
    let total_busy: Duration = workload.iter().map(|item| item.duration).sum();

    let start = Instant::now();
    for (id, item) in workload.into_iter().enumerate() {
        thread_pool.submit(move || -> Result<(), String> {
            spin_for(item.duration);
            if item.fail {
                Err(format!("task {id} failed on purpose"))
            } else {
                Ok(())
            }
        })?;
    }
    thread_pool.shutdown();
    thread_pool.await_termination();
    let elapsed = start.elapsed();

    let stats = thread_pool.stats();
    println!(
        "{} threads ran {} tasks ({} failed) in {elapsed:?}, for {total_busy:?} of work",
        thread_pool.num_threads(),
        stats.executed,
        stats.failed,
    );
    Ok(())
}

/// A task to simulate.
struct WorkItem {
    /// How long the task keeps its worker busy.
    duration: Duration,
    /// Whether the task reports a failure.
    fail: bool,
}

fn generate_workload(cli: &Cli) -> Vec<WorkItem> {
    let mut rng = ChaCha12Rng::seed_from_u64(cli.seed);
    (0..cli.num_tasks)
        .map(|_| WorkItem {
            duration: Duration::from_micros(rng.random_range(0..=cli.max_task_micros)),
            fail: rng.random_bool(cli.failure_rate.clamp(0.0, 1.0)),
        })
        .collect()
}

/// Busy-waits for the given duration, to simulate CPU-bound work.
fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

/// CLI tool to run a random workload on a thread pool.
#[derive(Parser, Debug, PartialEq)]
#[command(version)]
struct Cli {
    /// Number of worker threads. Default to the available parallelism.
    #[arg(long)]
    num_threads: Option<NonZeroUsize>,

    /// Policy to pin worker threads to CPUs.
    #[arg(long, value_enum, default_value_t = CpuPinningCli::No)]
    cpu_pinning: CpuPinningCli,

    /// Number of tasks to submit.
    #[arg(long, default_value_t = 10_000)]
    num_tasks: usize,

    /// Maximal duration of a task, in microseconds.
    #[arg(long, default_value_t = 500)]
    max_task_micros: u64,

    /// Probability that a task fails, between 0 and 1.
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Seed of the random workload.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Policy to pin worker threads to CPUs.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CpuPinningCli {
    /// Don't pin worker threads.
    No,
    /// Pin worker threads if supported on this platform.
    IfSupported,
    /// Pin worker threads, or fail.
    Always,
}
