// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! A closure-driven terminal subscriber.

use super::{BoxError, BoxSubscription, Subscriber};
use crate::context::FlowContext;

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(BoxError) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;

/// A terminal subscriber assembled from closures.
///
/// Requests unbounded demand at `on_subscribe`. The flow context it exposes
/// upstream can be seeded with [`CallbackSubscriber::with_context`]; this is
/// the usual way a caller-provided trace context enters a pipeline.
pub struct CallbackSubscriber<T> {
    context: FlowContext,
    next: NextFn<T>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T> CallbackSubscriber<T> {
    /// Creates a subscriber that runs `next` for every item.
    pub fn new(next: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            context: FlowContext::new(),
            next: Box::new(next),
            error: None,
            complete: None,
        }
    }

    /// Set the flow context exposed upstream.
    pub fn with_context(mut self, context: FlowContext) -> Self {
        self.context = context;
        self
    }

    /// Set the terminal error callback.
    pub fn with_on_error(mut self, error: impl FnMut(BoxError) + Send + 'static) -> Self {
        self.error = Some(Box::new(error));
        self
    }

    /// Set the terminal completion callback.
    pub fn with_on_complete(mut self, complete: impl FnMut() + Send + 'static) -> Self {
        self.complete = Some(Box::new(complete));
        self
    }
}

impl<T> Subscriber<T> for CallbackSubscriber<T> {
    fn context(&self) -> FlowContext {
        self.context.clone()
    }

    fn on_subscribe(&mut self, mut subscription: BoxSubscription) {
        subscription.request(u64::MAX);
    }

    fn on_next(&mut self, item: T) {
        (self.next)(item);
    }

    fn on_error(&mut self, error: BoxError) {
        if let Some(callback) = &mut self.error {
            callback(error);
        }
    }

    fn on_complete(&mut self) {
        if let Some(callback) = &mut self.complete {
            callback();
        }
    }
}
