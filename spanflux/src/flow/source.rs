// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Producing stages.

use super::Flow;
use crate::hook::{Hooks, StageKind};
use crate::subscriber::{BoxError, BoxSubscriber, Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A source emitting the items of an iterator, then completing.
pub struct Iter<T> {
    hooks: Arc<Hooks>,
    items: Vec<T>,
}

/// A source emitting exactly one item, then completing.
pub struct Just<T> {
    hooks: Arc<Hooks>,
    value: T,
}

/// A source that completes without emitting.
pub struct Empty<T> {
    hooks: Arc<Hooks>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

/// A source that errors without emitting.
pub struct Fail<T> {
    hooks: Arc<Hooks>,
    error: BoxError,
    _marker: std::marker::PhantomData<fn() -> T>,
}

/// Creates a source over the items of `items`.
pub fn iter<T, I>(hooks: &Arc<Hooks>, items: I) -> Iter<T>
where
    I: IntoIterator<Item = T>,
{
    Iter {
        hooks: hooks.clone(),
        items: items.into_iter().collect(),
    }
}

/// Creates a single-item source. Instant: the hook never wraps it.
pub fn just<T>(hooks: &Arc<Hooks>, value: T) -> Just<T> {
    Just { hooks: hooks.clone(), value }
}

/// Creates an empty source. Instant: the hook never wraps it.
pub fn empty<T>(hooks: &Arc<Hooks>) -> Empty<T> {
    Empty {
        hooks: hooks.clone(),
        _marker: std::marker::PhantomData,
    }
}

/// Creates a failing source. Instant: the hook never wraps it.
pub fn fail<T>(hooks: &Arc<Hooks>, error: BoxError) -> Fail<T> {
    Fail {
        hooks: hooks.clone(),
        error,
        _marker: std::marker::PhantomData,
    }
}

/// The subscription handed out by in-repo sources: demand is recorded but
/// not enforced, cancellation is honored between signals.
struct SourceSubscription {
    demand: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
}

impl Subscription for SourceSubscription {
    fn request(&mut self, n: u64) {
        self.demand.fetch_add(n, Ordering::AcqRel);
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl<T: Send + 'static> Flow<T> for Iter<T> {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let mut subscriber = this.hooks.decorate_each(StageKind::Source, "iter", subscriber);
        let demand = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        subscriber.on_subscribe(Box::new(SourceSubscription {
            demand,
            cancelled: cancelled.clone(),
        }));
        for item in this.items {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            subscriber.on_next(item);
        }
        if !cancelled.load(Ordering::Acquire) {
            subscriber.on_complete();
        }
    }
}

impl<T: Send + 'static> Flow<T> for Just<T> {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let mut subscriber = this.hooks.decorate_each(StageKind::Scalar, "just", subscriber);
        let cancelled = Arc::new(AtomicBool::new(false));
        subscriber.on_subscribe(Box::new(SourceSubscription {
            demand: Arc::new(AtomicU64::new(0)),
            cancelled: cancelled.clone(),
        }));
        if cancelled.load(Ordering::Acquire) {
            return;
        }
        subscriber.on_next(this.value);
        if !cancelled.load(Ordering::Acquire) {
            subscriber.on_complete();
        }
    }
}

impl<T: Send + 'static> Flow<T> for Empty<T> {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let mut subscriber = self.hooks.decorate_each(StageKind::Scalar, "empty", subscriber);
        let cancelled = Arc::new(AtomicBool::new(false));
        subscriber.on_subscribe(Box::new(SourceSubscription {
            demand: Arc::new(AtomicU64::new(0)),
            cancelled: cancelled.clone(),
        }));
        if !cancelled.load(Ordering::Acquire) {
            subscriber.on_complete();
        }
    }
}

impl<T: Send + 'static> Flow<T> for Fail<T> {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let mut subscriber = this.hooks.decorate_each(StageKind::Scalar, "fail", subscriber);
        let cancelled = Arc::new(AtomicBool::new(false));
        subscriber.on_subscribe(Box::new(SourceSubscription {
            demand: Arc::new(AtomicU64::new(0)),
            cancelled: cancelled.clone(),
        }));
        if !cancelled.load(Ordering::Acquire) {
            subscriber.on_error(this.error);
        }
    }
}
