// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! The scope-passing subscriber decorator.

use super::{BoxError, BoxSubscriber, BoxSubscription, Subscriber, Subscription};
use crate::context::FlowContext;
use crate::trace::{parent_from, CurrentTraceContext, TraceContext};
use std::sync::Arc;

/// Decorates a downstream subscriber so that every signal is delivered with
/// the pipeline's trace context ambient.
///
/// The [`FlowContext`] snapshot is taken once, at construction, never
/// re-read per signal: a stage's context does not drift if an upstream
/// operator later rebinds its own local copy. Each signal opens exactly one
/// scope, forwards exactly one signal and closes exactly one scope; the
/// close is drop-based and therefore holds even when the delegate panics.
/// Errors from the delegate propagate unchanged after the scope closes.
///
/// When the resolved parent context is absent the decorator never opens a
/// scope; that is the untraced path and stays close to free.
pub struct ScopePassingSubscriber<T> {
    downstream: BoxSubscriber<T>,
    context: FlowContext,
    store: Arc<dyn CurrentTraceContext>,
    parent: Option<TraceContext>,
}

impl<T> ScopePassingSubscriber<T> {
    /// Wraps `downstream`, snapshotting its flow context and resolving the
    /// parent trace context from that snapshot (falling back to the store's
    /// ambient context).
    pub fn new(downstream: BoxSubscriber<T>, store: Arc<dyn CurrentTraceContext>) -> Self {
        let context = downstream.context();
        let parent = parent_from(&context, store.as_ref());
        Self::with_parent(downstream, context, store, parent)
    }

    /// Wraps `downstream` with an already-resolved snapshot and parent.
    pub fn with_parent(
        downstream: BoxSubscriber<T>,
        context: FlowContext,
        store: Arc<dyn CurrentTraceContext>,
        parent: Option<TraceContext>,
    ) -> Self {
        Self {
            downstream,
            context,
            store,
            parent,
        }
    }

    /// The parent trace context this decorator scopes signals with.
    pub fn parent(&self) -> Option<&TraceContext> {
        self.parent.as_ref()
    }
}

impl<T> Subscriber<T> for ScopePassingSubscriber<T> {
    fn context(&self) -> FlowContext {
        self.context.clone()
    }

    fn scope_parent(&self) -> Option<TraceContext> {
        self.parent.clone()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        let subscription = ScopePassingSubscription {
            upstream: subscription,
            store: self.store.clone(),
            parent: self.parent.clone(),
        };
        let _scope = self.store.maybe_scope(self.parent.clone());
        self.downstream.on_subscribe(Box::new(subscription));
    }

    fn on_next(&mut self, item: T) {
        let _scope = self.store.maybe_scope(self.parent.clone());
        self.downstream.on_next(item);
    }

    fn on_error(&mut self, error: BoxError) {
        let _scope = self.store.maybe_scope(self.parent.clone());
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        let _scope = self.store.maybe_scope(self.parent.clone());
        self.downstream.on_complete();
    }
}

/// The subscription half of [`ScopePassingSubscriber`]: `request` and
/// `cancel` travel upstream under the same scope discipline.
struct ScopePassingSubscription {
    upstream: BoxSubscription,
    store: Arc<dyn CurrentTraceContext>,
    parent: Option<TraceContext>,
}

impl Subscription for ScopePassingSubscription {
    fn request(&mut self, n: u64) {
        let _scope = self.store.maybe_scope(self.parent.clone());
        self.upstream.request(n);
    }

    fn cancel(&mut self) {
        let _scope = self.store.maybe_scope(self.parent.clone());
        self.upstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::ThreadLocalCurrentTraceContext;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct Probe {
        store: ThreadLocalCurrentTraceContext,
        seen: Arc<Mutex<Vec<Option<TraceContext>>>>,
        requested: Arc<AtomicU64>,
    }

    impl Subscriber<u32> for Probe {
        fn on_subscribe(&mut self, mut subscription: BoxSubscription) {
            self.seen.lock().unwrap().push(self.store.context());
            subscription.request(u64::MAX);
            self.requested.fetch_add(1, Ordering::SeqCst);
        }

        fn on_next(&mut self, _item: u32) {
            self.seen.lock().unwrap().push(self.store.context());
        }

        fn on_error(&mut self, _error: BoxError) {
            self.seen.lock().unwrap().push(self.store.context());
        }

        fn on_complete(&mut self) {
            self.seen.lock().unwrap().push(self.store.context());
        }
    }

    struct NoopSubscription;

    impl Subscription for NoopSubscription {
        fn request(&mut self, _n: u64) {}
        fn cancel(&mut self) {}
    }

    #[test]
    fn test_every_signal_is_scoped_and_restored() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let parent = TraceContext::random();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let probe = Probe {
            store: ThreadLocalCurrentTraceContext::new(),
            seen: seen.clone(),
            requested: Arc::new(AtomicU64::new(0)),
        };

        let context = FlowContext::new().with(parent.clone());
        let mut subscriber =
            ScopePassingSubscriber::with_parent(Box::new(probe), context, store.clone(), Some(parent.clone()));

        subscriber.on_subscribe(Box::new(NoopSubscription));
        subscriber.on_next(1);
        subscriber.on_next(2);
        subscriber.on_complete();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|observed| observed.as_ref() == Some(&parent)));
        // The thread's ambient state is untouched outside signal delivery.
        assert_eq!(store.context(), None);
    }

    #[test]
    fn test_absent_parent_never_opens_a_scope() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let probe = Probe {
            store: ThreadLocalCurrentTraceContext::new(),
            seen: seen.clone(),
            requested: Arc::new(AtomicU64::new(0)),
        };

        let mut subscriber =
            ScopePassingSubscriber::with_parent(Box::new(probe), FlowContext::new(), store.clone(), None);
        subscriber.on_subscribe(Box::new(NoopSubscription));
        subscriber.on_next(7);
        subscriber.on_complete();

        assert!(seen.lock().unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_snapshot_resolution_prefers_flow_context() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let carried = TraceContext::random();

        struct Carrier(FlowContext);
        impl Subscriber<u32> for Carrier {
            fn context(&self) -> FlowContext {
                self.0.clone()
            }
            fn on_subscribe(&mut self, _subscription: BoxSubscription) {}
            fn on_next(&mut self, _item: u32) {}
            fn on_error(&mut self, _error: BoxError) {}
            fn on_complete(&mut self) {}
        }

        let carrier = Carrier(FlowContext::new().with(carried.clone()));
        let subscriber = ScopePassingSubscriber::new(Box::new(carrier), store);
        assert_eq!(subscriber.parent(), Some(&carried));
        assert_eq!(subscriber.scope_parent(), Some(carried));
    }
}
