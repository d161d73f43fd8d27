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

use std::sync::Arc;
use std::thread::JoinHandle;

use bincache_common_exception::ErrorCode;
use bincache_common_exception::Result;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use log::info;
use log::warn;
use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::runtime::catch_unwind;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Counts the tasks that are queued or running.
struct PendingTasks {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingTasks {
    fn create() -> Arc<PendingTasks> {
        Arc::new(PendingTasks {
            count: Mutex::new(0),
            idle: Condvar::new(),
        })
    }

    fn inc(&self) {
        *self.count.lock() += 1;
    }

    fn dec(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.count.lock()
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count != 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// A fixed set of named threads draining one unbounded task queue.
///
/// `execute` never blocks. Dropping the pool closes the queue, lets the workers finish
/// everything already queued and joins them.
pub struct ThreadPool {
    name: String,
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<PendingTasks>,
}

impl ThreadPool {
    pub fn create(threads: usize) -> Result<ThreadPool> {
        Self::create_named("thread-pool", threads)
    }

    pub fn create_named(name: impl Into<String>, threads: usize) -> Result<ThreadPool> {
        let name = name.into();
        if threads == 0 {
            return Err(ErrorCode::BadArguments(format!(
                "thread pool {} requires at least one thread",
                name
            )));
        }

        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let thread_name = format!("{}-{}", name, index);
            let thread_builder = std::thread::Builder::new().name(thread_name.clone());
            let handle = thread_builder
                .spawn(move || Self::work(thread_name, rx))
                .map_err(|e| {
                    ErrorCode::Internal(format!("spawn thread pool worker failed, {}", e))
                })?;
            workers.push(handle);
        }

        info!("thread pool {} started with {} threads", name, threads);
        Ok(ThreadPool {
            name,
            tx: Some(tx),
            workers,
            pending: PendingTasks::create(),
        })
    }

    fn work(thread_name: String, queue: Receiver<Task>) {
        while let Ok(task) = queue.recv() {
            task();
        }
        info!("{} shutdown", thread_name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Block until every task submitted so far has finished.
    pub fn wait_idle(&self) {
        self.pending.wait_idle()
    }

    pub fn execute<F, R>(&self, f: F) -> TaskJoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let pending = self.pending.clone();

        let task: Task = Box::new(move || {
            let result = catch_unwind(f);
            if let Err(cause) = &result {
                warn!("task panicked in thread pool: {}", cause);
            }

            // The handle may have been dropped, nobody waits for the result then.
            let _ = result_tx.send(result);
            pending.dec();
        });

        self.pending.inc();
        let sent = match &self.tx {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        };

        if !sent {
            self.pending.dec();
            warn!("thread pool {} is shut down, task dropped", self.name);
        }

        TaskJoinHandle { rx: result_rx }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the queue stops the workers once it is drained.
        drop(self.tx.take());

        let current = std::thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == current {
                continue;
            }

            if worker.join().is_err() {
                warn!("thread pool {} worker exited abnormally", self.name);
            }
        }
    }
}

pub struct TaskJoinHandle<T> {
    rx: Receiver<Result<T>>,
}

impl<T> TaskJoinHandle<T> {
    /// Wait for the task, a panic inside the task is returned as `PanicError`.
    pub fn join(self) -> Result<T> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(ErrorCode::Internal(
                "task was dropped before it was executed",
            )),
        }
    }
}
