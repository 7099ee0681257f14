// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Subscriber signal traits and the scope-passing decorators.

use crate::context::FlowContext;
use crate::trace::TraceContext;

mod binding;
mod callback;
mod lazy;
mod scope_passing;

pub use binding::ContextBindingSubscriber;
pub use callback::CallbackSubscriber;
pub use lazy::LazySubscriber;
pub use scope_passing::ScopePassingSubscriber;

/// The error payload of an `on_error` signal.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed [`Subscription`].
pub type BoxSubscription = Box<dyn Subscription>;

/// A boxed [`Subscriber`].
pub type BoxSubscriber<T> = Box<dyn Subscriber<T>>;

/// The upstream handle a subscriber receives in `on_subscribe`.
pub trait Subscription: Send {
    /// Signal demand for `n` more items.
    fn request(&mut self, n: u64);

    /// Signal that no further items are wanted.
    fn cancel(&mut self);
}

/// A consumer of an ordered sequence of signals.
///
/// Signals for one subscription are delivered sequentially, though not
/// necessarily on one thread. Decorators that need to make ambient state
/// consistent per signal (see [`ScopePassingSubscriber`]) wrap this trait.
pub trait Subscriber<T>: Send {
    /// The flow context visible to stages upstream of this subscriber.
    ///
    /// Decorators forward their downstream's context, adding entries of
    /// their own where they have any.
    fn context(&self) -> FlowContext {
        FlowContext::new()
    }

    /// The trace context this subscriber already passes scopes for, if it is
    /// a scope-passing decorator. Used to avoid stacking identical wrappers.
    fn scope_parent(&self) -> Option<TraceContext> {
        None
    }

    /// Receive the upstream subscription handle.
    fn on_subscribe(&mut self, subscription: BoxSubscription);

    /// Receive one item.
    fn on_next(&mut self, item: T);

    /// Receive the terminal error signal.
    fn on_error(&mut self, error: BoxError);

    /// Receive the terminal completion signal.
    fn on_complete(&mut self);
}

impl<T, S: Subscriber<T> + ?Sized> Subscriber<T> for Box<S> {
    fn context(&self) -> FlowContext {
        (**self).context()
    }

    fn scope_parent(&self) -> Option<TraceContext> {
        (**self).scope_parent()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        (**self).on_subscribe(subscription)
    }

    fn on_next(&mut self, item: T) {
        (**self).on_next(item)
    }

    fn on_error(&mut self, error: BoxError) {
        (**self).on_error(error)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }
}

impl<S: Subscription + ?Sized> Subscription for Box<S> {
    fn request(&mut self, n: u64) {
        (**self).request(n)
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}
