// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! A hot fan-out stage.

use super::{Flow, FlowError};
use crate::hook::{Hooks, StageKind};
use crate::subscriber::{BoxSubscriber, Subscriber, Subscription};
use faststr::FastStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A hot stage delivering every emitted item to all current subscribers.
///
/// Fan-out is why the hook skips this stage kind: one subscriber's wrapper,
/// captured at its subscribe time, must not bracket the deliveries made to
/// the other subscribers. Subscribers attached after termination receive the
/// completion signal immediately.
pub struct Multicast<T> {
    hooks: Arc<Hooks>,
    state: Arc<Mutex<MulticastState<T>>>,
}

struct MulticastState<T> {
    slots: Vec<Slot<T>>,
    terminated: bool,
}

struct Slot<T> {
    subscriber: BoxSubscriber<T>,
    cancelled: Arc<AtomicBool>,
}

struct MulticastSubscription {
    cancelled: Arc<AtomicBool>,
}

impl Subscription for MulticastSubscription {
    fn request(&mut self, _n: u64) {}

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl<T: Clone + Send + 'static> Multicast<T> {
    /// Creates a fan-out stage with no subscribers.
    pub fn new(hooks: Arc<Hooks>) -> Self {
        Self {
            hooks,
            state: Arc::new(Mutex::new(MulticastState {
                slots: Vec::new(),
                terminated: false,
            })),
        }
    }

    /// Deliver `item` to every current subscriber.
    pub fn emit(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        if state.terminated {
            return;
        }
        state.slots.retain(|slot| !slot.cancelled.load(Ordering::Acquire));
        for slot in &mut state.slots {
            slot.subscriber.on_next(item.clone());
        }
    }

    /// Complete every current subscriber and terminate the stage.
    pub fn complete(&self) {
        let mut state = self.state.lock().unwrap();
        if state.terminated {
            return;
        }
        state.terminated = true;
        for slot in state.slots.iter_mut().filter(|slot| !slot.cancelled.load(Ordering::Acquire)) {
            slot.subscriber.on_complete();
        }
        state.slots.clear();
    }

    /// Error every current subscriber and terminate the stage.
    pub fn fail(&self, message: impl Into<FastStr>) {
        let message = message.into();
        let mut state = self.state.lock().unwrap();
        if state.terminated {
            return;
        }
        state.terminated = true;
        for slot in state.slots.iter_mut().filter(|slot| !slot.cancelled.load(Ordering::Acquire)) {
            slot.subscriber.on_error(Box::new(FlowError::new(message.clone())));
        }
        state.slots.clear();
    }

    /// The number of attached, uncancelled subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.slots.retain(|slot| !slot.cancelled.load(Ordering::Acquire));
        state.slots.len()
    }
}

impl<T> Clone for Multicast<T> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Flow<T> for Multicast<T> {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        // The hook recognizes the fan-out kind and passes through unwrapped.
        let mut subscriber = self.hooks.decorate_each(StageKind::Multicast, "multicast", subscriber);
        let cancelled = Arc::new(AtomicBool::new(false));
        subscriber.on_subscribe(Box::new(MulticastSubscription {
            cancelled: cancelled.clone(),
        }));
        let mut state = self.state.lock().unwrap();
        if state.terminated {
            subscriber.on_complete();
            return;
        }
        state.slots.push(Slot { subscriber, cancelled });
    }
}
