// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Deferred-resolution subscriber for pipelines subscribed during bootstrap.

use super::{BoxError, BoxSubscriber, BoxSubscription, ScopePassingSubscriber, Subscriber};
use crate::context::FlowContext;
use crate::hook::ContextStoreProvider;
use crate::trace::TraceContext;
use std::sync::Arc;
use tracing::trace;

/// A subscriber decorator for pipelines constructed before the composition
/// root has a usable context store.
///
/// Resolution is attempted on each signal. Once the provider yields a store,
/// a [`ScopePassingSubscriber`] is built around the downstream and every
/// subsequent signal delegates to it. Until then signals are forwarded
/// unscoped, never blocked and never dropped. A provider that never becomes
/// ready simply leaves the whole subscription on the unscoped path.
pub struct LazySubscriber<T> {
    provider: Arc<dyn ContextStoreProvider>,
    downstream: Option<BoxSubscriber<T>>,
    resolved: Option<ScopePassingSubscriber<T>>,
    context: FlowContext,
}

impl<T> LazySubscriber<T> {
    /// Wraps `downstream`, deferring store resolution to `provider`.
    pub fn new(downstream: BoxSubscriber<T>, provider: Arc<dyn ContextStoreProvider>) -> Self {
        let context = downstream.context();
        Self {
            provider,
            downstream: Some(downstream),
            resolved: None,
            context,
        }
    }

    /// Whether the real scope-passing subscriber has been constructed.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    fn try_resolve(&mut self) {
        if self.resolved.is_some() {
            return;
        }
        let Some(store) = self.provider.try_store() else {
            return;
        };
        trace!("[SPANFLUX] store became available, switching to scope passing");
        let downstream = self.downstream.take().expect("downstream present until resolution");
        self.resolved = Some(ScopePassingSubscriber::new(downstream, store));
    }
}

impl<T> Subscriber<T> for LazySubscriber<T> {
    fn context(&self) -> FlowContext {
        self.context.clone()
    }

    fn scope_parent(&self) -> Option<TraceContext> {
        self.resolved.as_ref().and_then(|resolved| resolved.scope_parent())
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        self.try_resolve();
        match &mut self.resolved {
            Some(resolved) => resolved.on_subscribe(subscription),
            None => self.downstream.as_mut().expect("unresolved downstream").on_subscribe(subscription),
        }
    }

    fn on_next(&mut self, item: T) {
        self.try_resolve();
        match &mut self.resolved {
            Some(resolved) => resolved.on_next(item),
            None => self.downstream.as_mut().expect("unresolved downstream").on_next(item),
        }
    }

    fn on_error(&mut self, error: BoxError) {
        self.try_resolve();
        match &mut self.resolved {
            Some(resolved) => resolved.on_error(error),
            None => self.downstream.as_mut().expect("unresolved downstream").on_error(error),
        }
    }

    fn on_complete(&mut self) {
        self.try_resolve();
        match &mut self.resolved {
            Some(resolved) => resolved.on_complete(),
            None => self.downstream.as_mut().expect("unresolved downstream").on_complete(),
        }
    }
}
