// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that runs a few tasks on a pool of 2 worker threads.

use fixpool::ThreadPool;
use std::time::Duration;

fn main() -> fixpool::Result<()> {
    env_logger::init();

    let thread_pool = ThreadPool::new(2)?;
    for id in 0..5 {
        thread_pool.submit(move || {
            std::thread::sleep(Duration::from_millis(10 * id));
            println!(
                "task {id} ran on {}",
                std::thread::current().name().unwrap_or("<unnamed>")
            );
        })?;
    }

    thread_pool.shutdown();
    thread_pool.await_termination();

    if let Err(e) = thread_pool.submit(|| println!("never printed")) {
        println!("submission after shutdown: {e}");
    }
    println!("stats = {:?}", thread_pool.stats());
    Ok(())
}
