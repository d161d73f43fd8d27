// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use bincache_common_base::runtime::ThreadPool;
use bincache_common_exception::ErrorCode;
use bincache_common_exception::Result;

#[test]
fn test_thread_pool() -> Result<()> {
    let pool = ThreadPool::create(4)?;

    let instant = Instant::now();
    let mut join_handles = Vec::with_capacity(8);
    let executed_counter = Arc::new(AtomicUsize::new(0));
    for _index in 0..8 {
        let executed_counter = executed_counter.clone();
        join_handles.push(pool.execute(move || {
            std::thread::sleep(Duration::from_millis(300));
            executed_counter.fetch_add(1, Ordering::Release);
        }));
    }

    for join_handle in join_handles {
        join_handle.join()?;
    }

    assert_eq!(executed_counter.load(Ordering::Relaxed), 8);
    assert!(instant.elapsed() < Duration::from_millis(2000));
    Ok(())
}

#[test]
fn test_zero_threads_is_rejected() {
    let res = ThreadPool::create_named("empty", 0);
    assert_eq!(res.err().map(|e| e.code()), Some(ErrorCode::BAD_ARGUMENTS));
}

#[test]
fn test_panic_does_not_kill_worker() -> Result<()> {
    let pool = ThreadPool::create_named("panicky", 1)?;

    let res = pool.execute(|| panic!("boom")).join();
    let err = res.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PANIC_ERROR);
    assert!(err.message().contains("boom"));

    // The single worker is still alive.
    assert_eq!(pool.execute(|| 40 + 2).join()?, 42);
    Ok(())
}

#[test]
fn test_wait_idle() -> Result<()> {
    let pool = ThreadPool::create_named("idle", 2)?;
    let executed_counter = Arc::new(AtomicUsize::new(0));

    for _index in 0..16 {
        let executed_counter = executed_counter.clone();
        // Handles are dropped on purpose, tasks still run.
        let _ = pool.execute(move || {
            std::thread::sleep(Duration::from_millis(10));
            executed_counter.fetch_add(1, Ordering::Release);
        });
    }

    pool.wait_idle();
    assert_eq!(pool.pending(), 0);
    assert_eq!(executed_counter.load(Ordering::Acquire), 16);
    Ok(())
}

#[test]
fn test_drop_drains_queue() -> Result<()> {
    let executed_counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = ThreadPool::create_named("drain", 1)?;
        assert_eq!(pool.threads(), 1);
        for _index in 0..8 {
            let executed_counter = executed_counter.clone();
            let _ = pool.execute(move || {
                std::thread::sleep(Duration::from_millis(5));
                executed_counter.fetch_add(1, Ordering::Release);
            });
        }
    }

    assert_eq!(executed_counter.load(Ordering::Acquire), 8);
    Ok(())
}
