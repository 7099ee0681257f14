// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Stages that move signal delivery onto another thread.

use super::Flow;
use crate::context::FlowContext;
use crate::hook::{Hooks, StageKind};
use crate::scheduler::Worker;
use crate::subscriber::{BoxError, BoxSubscriber, BoxSubscription, Subscriber};
use std::marker::PhantomData;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::warn;

enum HopSignal<T> {
    Subscribe(BoxSubscription),
    Next(T),
    Error(BoxError),
    Complete,
}

/// Re-delivers every signal on one dedicated thread.
///
/// The hand-off is a bare channel, deliberately *not* mediated by the
/// scheduler wrapper: under boundary-only instrumentation the ambient
/// context is lost at this hop. Under per-stage instrumentation the
/// downstream wrappers re-open their scopes on the delivery thread.
pub struct ThreadHop<T, F> {
    source: F,
    hooks: Arc<Hooks>,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> ThreadHop<T, F>
where
    T: Send + 'static,
    F: Flow<T>,
{
    pub(crate) fn new(source: F) -> Self {
        let hooks = source.hooks().clone();
        Self {
            source,
            hooks,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Flow<T> for ThreadHop<T, F>
where
    T: Send + 'static,
    F: Flow<T> + 'static,
{
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let context = subscriber.context();
        let (sender, receiver) = mpsc::channel::<HopSignal<T>>();
        let mut downstream = subscriber;
        thread::spawn(move || {
            for signal in receiver {
                match signal {
                    HopSignal::Subscribe(subscription) => downstream.on_subscribe(subscription),
                    HopSignal::Next(item) => downstream.on_next(item),
                    HopSignal::Error(error) => {
                        downstream.on_error(error);
                        return;
                    },
                    HopSignal::Complete => {
                        downstream.on_complete();
                        return;
                    },
                }
            }
        });
        let inner = HopSubscriber { sender, context };
        let wrapped = this.hooks.decorate_each(StageKind::Operator, "thread_hop", Box::new(inner) as BoxSubscriber<T>);
        Box::new(this.source).subscribe_raw(wrapped);
    }
}

struct HopSubscriber<T> {
    sender: mpsc::Sender<HopSignal<T>>,
    context: FlowContext,
}

impl<T> HopSubscriber<T> {
    fn send(&self, signal: HopSignal<T>) {
        if self.sender.send(signal).is_err() {
            warn!("[SPANFLUX] hop thread is gone, dropping signal");
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for HopSubscriber<T> {
    fn context(&self) -> FlowContext {
        self.context.clone()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        self.send(HopSignal::Subscribe(subscription));
    }

    fn on_next(&mut self, item: T) {
        self.send(HopSignal::Next(item));
    }

    fn on_error(&mut self, error: BoxError) {
        self.send(HopSignal::Error(error));
    }

    fn on_complete(&mut self) {
        self.send(HopSignal::Complete);
    }
}

/// Re-delivers every signal as a task on a [`Worker`].
///
/// With a [`TraceWorker`](crate::scheduler::TraceWorker) the submission
/// captures the ambient context signal by signal, so the context survives
/// the hop even under boundary-only instrumentation.
pub struct PublishOn<T, F> {
    source: F,
    worker: Arc<dyn Worker>,
    hooks: Arc<Hooks>,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> PublishOn<T, F>
where
    T: Send + 'static,
    F: Flow<T>,
{
    pub(crate) fn new(source: F, worker: Arc<dyn Worker>) -> Self {
        let hooks = source.hooks().clone();
        Self {
            source,
            worker,
            hooks,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Flow<T> for PublishOn<T, F>
where
    T: Send + 'static,
    F: Flow<T> + 'static,
{
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>) {
        let this = *self;
        let context = subscriber.context();
        let inner = PublishOnSubscriber {
            downstream: Arc::new(Mutex::new(subscriber)),
            worker: this.worker,
            context,
        };
        let wrapped = this.hooks.decorate_each(StageKind::Operator, "publish_on", Box::new(inner) as BoxSubscriber<T>);
        Box::new(this.source).subscribe_raw(wrapped);
    }
}

struct PublishOnSubscriber<T> {
    downstream: Arc<Mutex<BoxSubscriber<T>>>,
    worker: Arc<dyn Worker>,
    context: FlowContext,
}

impl<T: Send + 'static> Subscriber<T> for PublishOnSubscriber<T> {
    fn context(&self) -> FlowContext {
        self.context.clone()
    }

    fn on_subscribe(&mut self, subscription: BoxSubscription) {
        let downstream = self.downstream.clone();
        self.worker.schedule(Box::new(move || {
            downstream.lock().unwrap().on_subscribe(subscription);
        }));
    }

    fn on_next(&mut self, item: T) {
        let downstream = self.downstream.clone();
        self.worker.schedule(Box::new(move || {
            downstream.lock().unwrap().on_next(item);
        }));
    }

    fn on_error(&mut self, error: BoxError) {
        let downstream = self.downstream.clone();
        self.worker.schedule(Box::new(move || {
            downstream.lock().unwrap().on_error(error);
        }));
    }

    fn on_complete(&mut self) {
        let downstream = self.downstream.clone();
        self.worker.schedule(Box::new(move || {
            downstream.lock().unwrap().on_complete();
        }));
    }
}
