// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Trace-carrying wrappers for the thread-hopping primitives.
//!
//! The subscriber decorators cover signals delivered within a chain; this
//! module covers work handed to another thread. A wrapped task captures the
//! submitting thread's ambient [`TraceContext`](crate::trace::TraceContext)
//! at submission time and re-applies it as a scope on whatever thread runs
//! the task. It is the same open/run/close discipline, anchored to executor
//! submission instead of signal delivery. The wrapper is applied uniformly
//! to every worker-creation path (immediate, delayed, periodic and serial
//! workers) so no hand-off silently drops context.

use crate::trace::CurrentTraceContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod backends;

pub use backends::{ThreadScheduler, TokioScheduler};

/// A unit of work submitted to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A repeating unit of work submitted to a scheduler.
pub type PeriodicTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// An executor abstraction over immediate, delayed, periodic and serial
/// execution.
pub trait Scheduler: Send + Sync {
    /// Run `task` as soon as a thread is available.
    fn schedule(&self, task: Task);

    /// Run `task` once, after `delay`.
    fn schedule_after(&self, delay: Duration, task: Task);

    /// Run `task` repeatedly, first after `initial_delay` and then every
    /// `period`, until the returned handle is cancelled.
    fn schedule_periodic(&self, initial_delay: Duration, period: Duration, task: PeriodicTask) -> PeriodicHandle;

    /// Create a worker that executes its tasks serially, in submission
    /// order.
    fn create_worker(&self) -> Arc<dyn Worker>;
}

/// A serial executor: tasks run one at a time, in submission order.
pub trait Worker: Send + Sync {
    /// Enqueue `task` on this worker.
    fn schedule(&self, task: Task);
}

/// Cancels a periodic schedule. Already-running iterations finish; no new
/// iteration starts after [`PeriodicHandle::cancel`].
#[derive(Clone, Debug, Default)]
pub struct PeriodicHandle {
    cancelled: Arc<AtomicBool>,
}

impl PeriodicHandle {
    /// Returns a fresh, uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the periodic schedule.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the schedule was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Wrap one task with the submitting thread's ambient context.
///
/// The context is captured here, at wrap time; execution opens a scope with
/// it, runs the task, and the scope's drop restores the executing thread's
/// prior state, so reused pool threads never leak context across tasks.
pub fn wrap_task(store: &Arc<dyn CurrentTraceContext>, task: Task) -> Task {
    let captured = store.context();
    let store = store.clone();
    Box::new(move || {
        let _scope = store.maybe_scope(captured);
        task();
    })
}

fn wrap_periodic(store: &Arc<dyn CurrentTraceContext>, task: PeriodicTask) -> PeriodicTask {
    let captured = store.context();
    let store = store.clone();
    Arc::new(move || {
        let _scope = store.maybe_scope(captured.clone());
        task();
    })
}

/// Decorates a [`Scheduler`] so that every submission path carries the
/// submitter's ambient context.
pub struct TraceScheduler<S: Scheduler> {
    delegate: S,
    store: Arc<dyn CurrentTraceContext>,
}

impl<S: Scheduler> TraceScheduler<S> {
    /// Wraps `delegate`, capturing and restoring contexts through `store`.
    pub fn new(delegate: S, store: Arc<dyn CurrentTraceContext>) -> Self {
        Self { delegate, store }
    }
}

impl<S: Scheduler> Scheduler for TraceScheduler<S> {
    fn schedule(&self, task: Task) {
        self.delegate.schedule(wrap_task(&self.store, task));
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        self.delegate.schedule_after(delay, wrap_task(&self.store, task));
    }

    fn schedule_periodic(&self, initial_delay: Duration, period: Duration, task: PeriodicTask) -> PeriodicHandle {
        self.delegate.schedule_periodic(initial_delay, period, wrap_periodic(&self.store, task))
    }

    fn create_worker(&self) -> Arc<dyn Worker> {
        Arc::new(TraceWorker {
            delegate: self.delegate.create_worker(),
            store: self.store.clone(),
        })
    }
}

/// The worker counterpart of [`TraceScheduler`].
///
/// The capture happens per task, in [`TraceWorker::schedule`], on the
/// submitting thread, because execution may happen on the worker thread
/// long after the submitter has moved on to another context.
pub struct TraceWorker {
    delegate: Arc<dyn Worker>,
    store: Arc<dyn CurrentTraceContext>,
}

impl TraceWorker {
    /// Wraps `delegate`, capturing and restoring contexts through `store`.
    pub fn new(delegate: Arc<dyn Worker>, store: Arc<dyn CurrentTraceContext>) -> Self {
        Self { delegate, store }
    }
}

impl Worker for TraceWorker {
    fn schedule(&self, task: Task) {
        self.delegate.schedule(wrap_task(&self.store, task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ThreadLocalCurrentTraceContext, TraceContext};
    use std::sync::Mutex;

    struct InlineScheduler;

    impl Scheduler for InlineScheduler {
        fn schedule(&self, task: Task) {
            task();
        }

        fn schedule_after(&self, _delay: Duration, task: Task) {
            task();
        }

        fn schedule_periodic(&self, _initial_delay: Duration, _period: Duration, task: PeriodicTask) -> PeriodicHandle {
            task();
            PeriodicHandle::new()
        }

        fn create_worker(&self) -> Arc<dyn Worker> {
            struct InlineWorker;
            impl Worker for InlineWorker {
                fn schedule(&self, task: Task) {
                    task();
                }
            }
            Arc::new(InlineWorker)
        }
    }

    #[test]
    fn test_wrap_task_captures_at_submission_time() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let submitted = TraceContext::random();
        let observed = Arc::new(Mutex::new(None));

        let task = {
            let _ambient = store.maybe_scope(Some(submitted.clone()));
            let probe = ThreadLocalCurrentTraceContext::new();
            let observed = observed.clone();
            wrap_task(
                &store,
                Box::new(move || {
                    *observed.lock().unwrap() = probe.context();
                }),
            )
        };

        // Run outside the submitting scope: the captured context must win.
        task();
        assert_eq!(observed.lock().unwrap().clone(), Some(submitted));
        assert_eq!(store.context(), None);
    }

    #[test]
    fn test_trace_scheduler_wraps_every_path() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let scheduler = TraceScheduler::new(InlineScheduler, store.clone());
        let submitted = TraceContext::random();
        let observed = Arc::new(Mutex::new(Vec::new()));

        let _ambient = store.maybe_scope(Some(submitted.clone()));
        let probe = ThreadLocalCurrentTraceContext::new();

        let record = |observed: &Arc<Mutex<Vec<Option<TraceContext>>>>| {
            let observed = observed.clone();
            move || {
                observed.lock().unwrap().push(probe.context());
            }
        };

        scheduler.schedule(Box::new(record(&observed)));
        scheduler.schedule_after(Duration::ZERO, Box::new(record(&observed)));
        let handle = scheduler.schedule_periodic(Duration::ZERO, Duration::ZERO, Arc::new(record(&observed)));
        handle.cancel();
        scheduler.create_worker().schedule(Box::new(record(&observed)));

        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 4);
        assert!(observed.iter().all(|context| context.as_ref() == Some(&submitted)));
    }
}
