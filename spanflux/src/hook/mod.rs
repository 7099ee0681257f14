// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! The operator interception hook and its registration point.
//!
//! Every pipeline stage construction passes through a [`Hooks`] instance,
//! which consults the installed [`Instrumentation`] strategy to decide
//! whether the stage's subscriber gets wrapped. The hook is an explicit
//! object owned by the composition root and passed by [`Arc`] to wherever
//! pipelines are constructed, deliberately not a hidden static singleton.
//! Its lifecycle is observable: [`Hooks::install`] at startup,
//! [`Hooks::reset`] at shutdown and in test teardown.

use crate::scheduler::{wrap_task, Scheduler, Task, TraceScheduler};
use crate::subscriber::{BoxSubscriber, ContextBindingSubscriber, LazySubscriber, ScopePassingSubscriber, Subscriber};
use crate::trace::{parent_from, CurrentTraceContext, TraceContext};
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

mod mode;
mod stage;

pub use mode::{ConfigError, InstrumentationMode, PropagationConfig};
pub use stage::StageKind;

/// Hands out the context store once the surrounding system is ready for it.
///
/// During process bootstrap pipelines may be constructed, and even
/// subscribed to, before a usable store exists; the provider is the seam
/// that lets the hook defer resolution instead of blocking or failing.
pub trait ContextStoreProvider: Send + Sync {
    /// Returns the store, or `None` while it is not available yet.
    fn try_store(&self) -> Option<Arc<dyn CurrentTraceContext>>;
}

/// A provider over a store that is available from the start.
pub struct FixedStoreProvider {
    store: Arc<dyn CurrentTraceContext>,
}

impl FixedStoreProvider {
    /// Wraps an always-available store.
    pub fn new(store: Arc<dyn CurrentTraceContext>) -> Self {
        Self { store }
    }
}

impl ContextStoreProvider for FixedStoreProvider {
    fn try_store(&self) -> Option<Arc<dyn CurrentTraceContext>> {
        Some(self.store.clone())
    }
}

/// A provider whose store is published at some later point, if ever.
#[derive(Default)]
pub struct DeferredStoreProvider {
    slot: OnceLock<Arc<dyn CurrentTraceContext>>,
}

impl DeferredStoreProvider {
    /// Returns a provider with no store yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the store. Returns `false` if one was already published.
    pub fn ready(&self, store: Arc<dyn CurrentTraceContext>) -> bool {
        self.slot.set(store).is_ok()
    }
}

impl ContextStoreProvider for DeferredStoreProvider {
    fn try_store(&self) -> Option<Arc<dyn CurrentTraceContext>> {
        self.slot.get().cloned()
    }
}

/// The installed strategy: which stages get wrapped, against which store.
///
/// The mode is read once at construction and stays immutable; changing it
/// means building a new strategy and installing that.
pub struct Instrumentation {
    mode: InstrumentationMode,
    provider: Arc<dyn ContextStoreProvider>,
}

impl Instrumentation {
    /// Builds a strategy from a validated config and a store provider.
    pub fn new(config: PropagationConfig, provider: Arc<dyn ContextStoreProvider>) -> Self {
        Self { mode: config.mode, provider }
    }

    /// Builds a strategy over an always-available store.
    pub fn with_store(config: PropagationConfig, store: Arc<dyn CurrentTraceContext>) -> Self {
        Self::new(config, Arc::new(FixedStoreProvider::new(store)))
    }

    /// The mode this strategy was installed with.
    #[inline]
    pub fn mode(&self) -> InstrumentationMode {
        self.mode
    }

    /// Decide whether a newly constructed stage's subscriber gets wrapped.
    ///
    /// Only [`InstrumentationMode::WrapEach`] wraps here. Non-wrappable
    /// stage kinds pass through, as do untraced chains (no parent context
    /// anywhere) and subscribers that already pass scopes for the same
    /// parent. While the store provider is not ready the subscriber is
    /// wrapped for deferred resolution instead.
    pub fn decorate_each<T: 'static>(&self, kind: StageKind, name: &'static str, subscriber: BoxSubscriber<T>) -> BoxSubscriber<T> {
        if self.mode != InstrumentationMode::WrapEach {
            return subscriber;
        }
        if !kind.wrappable() {
            trace!("[SPANFLUX] leaving stage {name} ({kind:?}) unwrapped");
            return subscriber;
        }
        let Some(store) = self.provider.try_store() else {
            trace!("[SPANFLUX] context store not ready, deferring resolution for stage {name}");
            return Box::new(LazySubscriber::new(subscriber, self.provider.clone()));
        };
        let context = subscriber.context();
        let Some(parent) = parent_from(&context, store.as_ref()) else {
            return subscriber;
        };
        if subscriber.scope_parent().as_ref() == Some(&parent) {
            trace!("[SPANFLUX] stage {name} already passes scopes for this context");
            return subscriber;
        }
        trace!("[SPANFLUX] wrapping stage {name} for trace {}", parent.trace_id());
        Box::new(ScopePassingSubscriber::with_parent(subscriber, context, store, Some(parent)))
    }

    /// Decorate the subscription-time boundary subscriber.
    ///
    /// This is the only wrap under [`InstrumentationMode::WrapBoundaryOnly`]
    /// and the outer wrap under [`InstrumentationMode::WrapEach`]. Under
    /// [`InstrumentationMode::Manual`] nothing is scoped; the store handle
    /// is bound into the flow context instead so that explicit propagation
    /// can reach it.
    pub fn decorate_last<T: 'static>(&self, subscriber: BoxSubscriber<T>) -> BoxSubscriber<T> {
        match self.mode {
            InstrumentationMode::Manual => match self.provider.try_store() {
                Some(store) => Box::new(ContextBindingSubscriber::new(subscriber, store)),
                None => subscriber,
            },
            InstrumentationMode::WrapEach | InstrumentationMode::WrapBoundaryOnly => {
                let Some(store) = self.provider.try_store() else {
                    trace!("[SPANFLUX] context store not ready, deferring boundary resolution");
                    return Box::new(LazySubscriber::new(subscriber, self.provider.clone()));
                };
                let context = subscriber.context();
                let carried = context.get::<TraceContext>().map(|carried| (*carried).clone());
                let ambient = store.context();
                if self.mode == InstrumentationMode::WrapEach && ambient.is_some() && carried == ambient {
                    // the per-stage wraps already cover a chain whose
                    // context is the ambient one
                    return subscriber;
                }
                let Some(parent) = carried.or(ambient) else {
                    return subscriber;
                };
                if subscriber.scope_parent().as_ref() == Some(&parent) {
                    return subscriber;
                }
                trace!("[SPANFLUX] wrapping boundary for trace {}", parent.trace_id());
                Box::new(ScopePassingSubscriber::with_parent(subscriber, context, store, Some(parent)))
            },
        }
    }

    /// Wrap a task handed to a scheduler so it carries the submitting
    /// thread's ambient context. Manual mode leaves tasks untouched.
    pub fn wrap_schedule(&self, task: Task) -> Task {
        if self.mode == InstrumentationMode::Manual {
            return task;
        }
        match self.provider.try_store() {
            Some(store) => wrap_task(&store, task),
            None => task,
        }
    }

    /// Wrap a scheduler so that every worker-creation and submission path
    /// carries the submitter's context. Manual mode, and a provider that is
    /// not ready, leave the scheduler unchanged.
    pub fn decorate_scheduler(&self, scheduler: impl Scheduler + 'static) -> Box<dyn Scheduler> {
        if self.mode == InstrumentationMode::Manual {
            return Box::new(scheduler);
        }
        match self.provider.try_store() {
            Some(store) => Box::new(TraceScheduler::new(scheduler, store)),
            None => Box::new(scheduler),
        }
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation").field("mode", &self.mode).finish_non_exhaustive()
    }
}

/// The process-facing registration point for one [`Instrumentation`].
///
/// Exactly one strategy is active at a time; [`Hooks::install`] atomically
/// replaces the previous one. With nothing installed every decoration is a
/// pass-through, so pipelines built against an un-installed `Hooks` run
/// untraced rather than failing.
#[derive(Default)]
pub struct Hooks {
    active: ArcSwapOption<Instrumentation>,
}

impl Hooks {
    /// Returns a registration point with nothing installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a strategy, atomically replacing any previous one.
    pub fn install(&self, instrumentation: Instrumentation) {
        debug!("[SPANFLUX] installing {} instrumentation", instrumentation.mode().as_str());
        self.active.store(Some(Arc::new(instrumentation)));
    }

    /// Remove the active strategy. Used at shutdown and in test teardown.
    pub fn reset(&self) {
        debug!("[SPANFLUX] resetting instrumentation");
        self.active.store(None);
    }

    /// Whether a strategy is installed.
    pub fn is_installed(&self) -> bool {
        self.active.load().is_some()
    }

    /// The installed mode, if any.
    pub fn mode(&self) -> Option<InstrumentationMode> {
        self.active.load().as_ref().map(|active| active.mode())
    }

    /// See [`Instrumentation::decorate_each`].
    pub fn decorate_each<T: 'static>(&self, kind: StageKind, name: &'static str, subscriber: BoxSubscriber<T>) -> BoxSubscriber<T> {
        match self.active.load_full() {
            Some(active) => active.decorate_each(kind, name, subscriber),
            None => subscriber,
        }
    }

    /// See [`Instrumentation::decorate_last`].
    pub fn decorate_last<T: 'static>(&self, subscriber: BoxSubscriber<T>) -> BoxSubscriber<T> {
        match self.active.load_full() {
            Some(active) => active.decorate_last(subscriber),
            None => subscriber,
        }
    }

    /// See [`Instrumentation::wrap_schedule`].
    pub fn wrap_schedule(&self, task: Task) -> Task {
        match self.active.load_full() {
            Some(active) => active.wrap_schedule(task),
            None => task,
        }
    }

    /// See [`Instrumentation::decorate_scheduler`].
    pub fn decorate_scheduler(&self, scheduler: impl Scheduler + 'static) -> Box<dyn Scheduler> {
        match self.active.load_full() {
            Some(active) => active.decorate_scheduler(scheduler),
            None => Box::new(scheduler),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("mode", &self.mode()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{BoxError, BoxSubscription, Subscriber};
    use crate::trace::{StoreHandle, ThreadLocalCurrentTraceContext};

    struct Sink;

    impl Subscriber<u32> for Sink {
        fn on_subscribe(&mut self, _subscription: BoxSubscription) {}
        fn on_next(&mut self, _item: u32) {}
        fn on_error(&mut self, _error: BoxError) {}
        fn on_complete(&mut self) {}
    }

    fn store() -> Arc<dyn CurrentTraceContext> {
        Arc::new(ThreadLocalCurrentTraceContext::new())
    }

    #[test]
    fn test_install_and_reset_lifecycle() {
        let hooks = Hooks::new();
        assert!(!hooks.is_installed());

        hooks.install(Instrumentation::with_store(PropagationConfig::new(), store()));
        assert_eq!(hooks.mode(), Some(InstrumentationMode::WrapEach));

        hooks.install(Instrumentation::with_store(
            PropagationConfig::new().with_mode(InstrumentationMode::Manual),
            store(),
        ));
        assert_eq!(hooks.mode(), Some(InstrumentationMode::Manual));

        hooks.reset();
        assert!(!hooks.is_installed());
        assert_eq!(hooks.mode(), None);
    }

    #[test]
    fn test_untraced_chain_is_left_unwrapped() {
        let instrumentation = Instrumentation::with_store(PropagationConfig::new(), store());
        let decorated = instrumentation.decorate_each(StageKind::Operator, "map", Box::new(Sink) as BoxSubscriber<u32>);
        assert_eq!(decorated.scope_parent(), None);
    }

    #[test]
    fn test_traced_chain_is_wrapped_once() {
        let store = store();
        let instrumentation = Instrumentation::with_store(PropagationConfig::new(), store.clone());
        let parent = TraceContext::random();
        let _ambient = store.maybe_scope(Some(parent.clone()));

        let wrapped = instrumentation.decorate_each(StageKind::Operator, "map", Box::new(Sink) as BoxSubscriber<u32>);
        assert_eq!(wrapped.scope_parent(), Some(parent.clone()));

        // Handing the wrapper back in must not stack a second one.
        let rewrapped = instrumentation.decorate_each(StageKind::Operator, "map", wrapped);
        assert_eq!(rewrapped.scope_parent(), Some(parent));
    }

    #[test]
    fn test_multicast_stages_are_skipped() {
        let store = store();
        let instrumentation = Instrumentation::with_store(PropagationConfig::new(), store.clone());
        let _ambient = store.maybe_scope(Some(TraceContext::random()));

        let decorated =
            instrumentation.decorate_each(StageKind::Multicast, "multicast", Box::new(Sink) as BoxSubscriber<u32>);
        assert_eq!(decorated.scope_parent(), None);
    }

    #[test]
    fn test_manual_mode_binds_the_store_handle() {
        let instrumentation =
            Instrumentation::with_store(PropagationConfig::new().with_mode(InstrumentationMode::Manual), store());
        let bound = instrumentation.decorate_last(Box::new(Sink) as BoxSubscriber<u32>);
        assert!(bound.context().contains::<StoreHandle>());
        assert_eq!(bound.scope_parent(), None);
    }

    #[test]
    fn test_wrap_schedule_captures_unless_manual() {
        let store = store();
        let context = TraceContext::random();
        let each = Instrumentation::with_store(PropagationConfig::new(), store.clone());
        let manual = Instrumentation::with_store(PropagationConfig::new().with_mode(InstrumentationMode::Manual), store.clone());

        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (each_task, manual_task) = {
            let _ambient = store.maybe_scope(Some(context.clone()));
            let record = |observed: &Arc<std::sync::Mutex<Vec<Option<TraceContext>>>>| {
                let observed = observed.clone();
                Box::new(move || {
                    observed.lock().unwrap().push(crate::trace::ThreadLocalCurrentTraceContext::new().context());
                })
            };
            (each.wrap_schedule(record(&observed)), manual.wrap_schedule(record(&observed)))
        };

        // Run outside the submitting scope.
        each_task();
        manual_task();
        assert_eq!(*observed.lock().unwrap(), vec![Some(context), None]);
    }

    #[test]
    fn test_decorate_scheduler_defers_the_submitter_context() {
        use crate::scheduler::{PeriodicHandle, PeriodicTask, Scheduler, Worker};
        use std::time::Duration;

        /// Stashes tasks so they can be run after the submitting scope ends.
        #[derive(Clone, Default)]
        struct Stash(Arc<std::sync::Mutex<Vec<Task>>>);

        impl Scheduler for Stash {
            fn schedule(&self, task: Task) {
                self.0.lock().unwrap().push(task);
            }
            fn schedule_after(&self, _delay: Duration, task: Task) {
                self.0.lock().unwrap().push(task);
            }
            fn schedule_periodic(&self, _initial_delay: Duration, _period: Duration, task: PeriodicTask) -> PeriodicHandle {
                self.0.lock().unwrap().push(Box::new(move || task()));
                PeriodicHandle::new()
            }
            fn create_worker(&self) -> Arc<dyn Worker> {
                struct StashWorker(Stash);
                impl Worker for StashWorker {
                    fn schedule(&self, task: Task) {
                        (self.0).0.lock().unwrap().push(task);
                    }
                }
                Arc::new(StashWorker(self.clone()))
            }
        }

        let store = store();
        let hooks = Hooks::new();
        hooks.install(Instrumentation::with_store(PropagationConfig::new(), store.clone()));

        let stash = Stash::default();
        let scheduler = hooks.decorate_scheduler(stash.clone());
        let context = TraceContext::random();
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let _ambient = store.maybe_scope(Some(context.clone()));
            let record = observed.clone();
            scheduler.schedule(Box::new(move || {
                record.lock().unwrap().push(crate::trace::ThreadLocalCurrentTraceContext::new().context());
            }));
            let record = observed.clone();
            scheduler.create_worker().schedule(Box::new(move || {
                record.lock().unwrap().push(crate::trace::ThreadLocalCurrentTraceContext::new().context());
            }));
        }

        for task in stash.0.lock().unwrap().drain(..) {
            task();
        }
        assert_eq!(*observed.lock().unwrap(), vec![Some(context.clone()), Some(context)]);
    }

    #[test]
    fn test_not_ready_provider_defers_resolution() {
        let provider = Arc::new(DeferredStoreProvider::new());
        let instrumentation = Instrumentation::new(PropagationConfig::new(), provider.clone());

        let decorated = instrumentation.decorate_each(StageKind::Operator, "map", Box::new(Sink) as BoxSubscriber<u32>);
        // Unresolved lazy wrapper: no scope parent yet.
        assert_eq!(decorated.scope_parent(), None);
    }
}
