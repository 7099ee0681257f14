// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Transforming stages.

use super::Flow;
use crate::context::FlowContext;
use crate::hook::{Hooks, StageKind};
use crate::subscriber::{BoxError, BoxSubscriber, BoxSubscription, Subscriber};
use std::marker::PhantomData;
use std::sync::Arc;

/// Transforms each item with a mapper function.
pub struct Map<T, U, F, M> {
    source: F,
    mapper: M,
    hooks: Arc<Hooks>,
    _marker: PhantomData<fn(T) -> U>,
}

impl<T, U, F, M> Map<T, U, F, M>
where
    T: Send + 'static,
    F: Flow<T>,
{
    pub(crate) fn new(source: F, mapper: M) -> Self {
        let hooks = source.hooks().clone();
        Self {
            source,
            mapper,
            hooks,
            _marker: PhantomData,
        }
    }
}

impl<T, U, F, M> Flow<U> for Map<T, U, F, M>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Flow<T> + 'static,
    M: FnMut(T) -> U + Send + 'static,
{
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<U>) {
        let this = *self;
        let inner = MapSubscriber {
            downstream: subscriber,
            mapper: this.mapper,
        };
        let wrapped = this.hooks.decorate_each(StageKind::Operator, "map", Box::new(inner) as BoxSubscriber<T>);
        Box::new(this.source).subscribe_raw(wrapped);
    }
}

struct MapSubscriber<U, M> {
    downstream: BoxSubscriber<U>,
    mapper: M,
}

impl<T, U, M> Subscriber<T> for MapSubscriber<U, M>
where
    T: Send,
    U: Send,
    M: FnMut(T) -> U + Send,
{
    fn context(&self) -> FlowContext {
        self.downstream.context()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: T) {
        let mapped = (self.mapper)(item);
        self.downstream.on_next(mapped);
    }

    fn on_error(&mut self, error: BoxError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

/// Drops items that do not match a predicate.
pub struct Filter<T, F, P> {
    source: F,
    predicate: P,
    hooks: Arc<Hooks>,
    _marker: PhantomData<fn(T)>,
}

impl<T, F, P> Filter<T, F, P>
where
    T: Send + 'static,
    F: Flow<T>,
{
    pub(crate) fn new(source: F, predicate: P) -> Self {
        let hooks = source.hooks().clone();
        Self {
            source,
            predicate,
            hooks,
            _marker: PhantomData,
        }
    }
}

impl<T, F, P> Flow<T> for Filter<T, F, P>
where
    T: Send + 'static,
    F: Flow<T> + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let inner = FilterSubscriber {
            downstream: subscriber,
            predicate: this.predicate,
        };
        let wrapped = this.hooks.decorate_each(StageKind::Operator, "filter", Box::new(inner) as BoxSubscriber<T>);
        Box::new(this.source).subscribe_raw(wrapped);
    }
}

struct FilterSubscriber<T, P> {
    downstream: BoxSubscriber<T>,
    predicate: P,
}

impl<T, P> Subscriber<T> for FilterSubscriber<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn context(&self) -> FlowContext {
        self.downstream.context()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: T) {
        if (self.predicate)(&item) {
            self.downstream.on_next(item);
        }
    }

    fn on_error(&mut self, error: BoxError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

/// Enriches the flow context visible to stages upstream of this point.
///
/// The writer runs once, at subscription time, against the downstream's
/// context; signals pass through untouched.
pub struct ContextWrite<T, F, W> {
    source: F,
    writer: W,
    hooks: Arc<Hooks>,
    _marker: PhantomData<fn(T)>,
}

impl<T, F, W> ContextWrite<T, F, W>
where
    T: Send + 'static,
    F: Flow<T>,
{
    pub(crate) fn new(source: F, writer: W) -> Self {
        let hooks = source.hooks().clone();
        Self {
            source,
            writer,
            hooks,
            _marker: PhantomData,
        }
    }
}

impl<T, F, W> Flow<T> for ContextWrite<T, F, W>
where
    T: Send + 'static,
    F: Flow<T> + 'static,
    W: FnOnce(FlowContext) -> FlowContext + Send + 'static,
{
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let context = (this.writer)(subscriber.context());
        let inner = ContextWriteSubscriber {
            downstream: subscriber,
            context,
        };
        let wrapped = this.hooks.decorate_each(StageKind::Operator, "context_write", Box::new(inner) as BoxSubscriber<T>);
        Box::new(this.source).subscribe_raw(wrapped);
    }
}

struct ContextWriteSubscriber<T> {
    downstream: BoxSubscriber<T>,
    context: FlowContext,
}

impl<T: Send> Subscriber<T> for ContextWriteSubscriber<T> {
    fn context(&self) -> FlowContext {
        self.context.clone()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, item: T) {
        self.downstream.on_next(item);
    }

    fn on_error(&mut self, error: BoxError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{iter, FlowExt};
    use crate::subscriber::CallbackSubscriber;
    use crate::trace::TraceContext;
    use std::sync::Mutex;

    #[test]
    fn test_map_and_filter_transform_items() {
        let hooks = Arc::new(Hooks::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            CallbackSubscriber::new(move |item: u32| seen.lock().unwrap().push(item))
        };
        iter(&hooks, 1..=6).filter(|item| item % 2 == 0).map(|item| item * 10).subscribe(sink);
        assert_eq!(*seen.lock().unwrap(), vec![20, 40, 60]);
    }

    #[test]
    fn test_context_write_is_visible_upstream() {
        use crate::hook::{Instrumentation, PropagationConfig};
        use crate::trace::{CurrentTraceContext, ThreadLocalCurrentTraceContext};

        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let hooks = Arc::new(Hooks::new());
        hooks.install(Instrumentation::with_store(PropagationConfig::new(), store.clone()));

        let context = TraceContext::random();
        let probe = ThreadLocalCurrentTraceContext::new();
        let above = Arc::new(Mutex::new(None));

        let record_above = above.clone();
        iter(&hooks, vec![1_u32])
            .map(move |item| {
                *record_above.lock().unwrap() = probe.context();
                item
            })
            .with_trace_context(context.clone())
            .subscribe(CallbackSubscriber::new(|_item: u32| ()));

        // The stage upstream of the write ran inside the written context,
        // with no ambient context anywhere at subscription time.
        assert_eq!(above.lock().unwrap().clone(), Some(context));
        // And the subscribing thread's ambient state is untouched after.
        assert_eq!(store.context(), None);
    }
}
