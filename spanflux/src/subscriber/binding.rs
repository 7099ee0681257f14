// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Store binding for manually instrumented pipelines.

use super::{BoxError, BoxSubscriber, BoxSubscription, Subscriber};
use crate::context::FlowContext;
use crate::trace::{CurrentTraceContext, StoreHandle};
use std::sync::Arc;

/// Forwards every signal unscoped, only binding a [`StoreHandle`] into the
/// flow context seen upstream.
///
/// This is the manual-instrumentation decorator: nothing is wrapped and no
/// scope is ever opened automatically, but code inside the pipeline can
/// retrieve the store from its flow context and propagate explicitly.
pub struct ContextBindingSubscriber<T> {
    downstream: BoxSubscriber<T>,
    context: FlowContext,
}

impl<T> ContextBindingSubscriber<T> {
    /// Wraps `downstream`, adding `store` to its flow context unless a
    /// handle is already bound.
    pub fn new(downstream: BoxSubscriber<T>, store: Arc<dyn CurrentTraceContext>) -> Self {
        let inherited = downstream.context();
        let context = if inherited.contains::<StoreHandle>() {
            inherited
        } else {
            inherited.with(StoreHandle::new(store))
        };
        Self { downstream, context }
    }
}

impl<T> Subscriber<T> for ContextBindingSubscriber<T> {
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
