// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Scheduler backends: dedicated threads and a tokio runtime handle.

use super::{PeriodicHandle, PeriodicTask, Scheduler, Task, Worker};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// A scheduler that runs every task on a dedicated OS thread.
///
/// Workers are a single thread draining a queue, so worker tasks run
/// serially in submission order. Dropping the worker handle shuts the
/// thread down once the queue is drained.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    /// Returns the thread-per-task scheduler.
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        thread::spawn(move || task());
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        thread::spawn(move || {
            thread::sleep(delay);
            task();
        });
    }

    fn schedule_periodic(&self, initial_delay: Duration, period: Duration, task: PeriodicTask) -> PeriodicHandle {
        let handle = PeriodicHandle::new();
        let watch = handle.clone();
        thread::spawn(move || {
            thread::sleep(initial_delay);
            while !watch.is_cancelled() {
                task();
                thread::sleep(period);
            }
        });
        handle
    }

    fn create_worker(&self) -> Arc<dyn Worker> {
        let (sender, receiver) = mpsc::channel::<Task>();
        thread::spawn(move || {
            for task in receiver {
                task();
            }
        });
        Arc::new(ThreadWorker { sender })
    }
}

struct ThreadWorker {
    sender: mpsc::Sender<Task>,
}

impl Worker for ThreadWorker {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("[SPANFLUX] worker thread is gone, dropping task");
        }
    }
}

/// A scheduler backed by a tokio runtime handle.
///
/// Immediate tasks go to the blocking pool (they are synchronous closures);
/// delayed and periodic tasks ride the runtime's timer. Workers drain an
/// unbounded channel on one runtime task, so worker tasks run serially in
/// submission order.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Wraps an explicit runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Wraps the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like
    /// [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }

    fn schedule_periodic(&self, initial_delay: Duration, period: Duration, task: PeriodicTask) -> PeriodicHandle {
        let handle = PeriodicHandle::new();
        let watch = handle.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            while !watch.is_cancelled() {
                task();
                tokio::time::sleep(period).await;
            }
        });
        handle
    }

    fn create_worker(&self) -> Arc<dyn Worker> {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Task>();
        self.handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
        });
        Arc::new(TokioWorker { sender })
    }
}

struct TokioWorker {
    sender: tokio::sync::mpsc::UnboundedSender<Task>,
}

impl Worker for TokioWorker {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("[SPANFLUX] worker task is gone, dropping task");
        }
    }
}
