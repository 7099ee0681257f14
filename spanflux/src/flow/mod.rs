// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! A small push-based pipeline whose every stage routes through the
//! interception hook.
//!
//! This layer exists so the propagation engine has stages to intercept:
//! each operator hands its upstream-facing subscriber to
//! [`Hooks::decorate_each`] at subscription time, and the terminal
//! [`FlowExt::subscribe`] routes through [`Hooks::decorate_last`]. Sources
//! are unbounded: demand is recorded but not enforced, `cancel` is honored
//! between signals, and signals for one subscription are delivered
//! sequentially. The engine itself never reorders, buffers or batches
//! signals; it only brackets them.

use crate::context::FlowContext;
use crate::hook::Hooks;
use crate::scheduler::Worker;
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::trace::TraceContext;
use faststr::FastStr;
use std::sync::Arc;

mod hop;
mod multicast;
mod operator;
mod source;

pub use hop::{PublishOn, ThreadHop};
pub use multicast::Multicast;
pub use operator::{ContextWrite, Filter, Map};
pub use source::{empty, fail, iter, just, Empty, Fail, Iter, Just};

/// The terminal error signalled by in-repo sources and fan-out stages.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FlowError(FastStr);

impl FlowError {
    /// Creates an error carrying `message`.
    pub fn new(message: impl Into<FastStr>) -> Self {
        Self(message.into())
    }
}

/// A stage that can be subscribed to.
///
/// `subscribe_raw` consumes the stage and must pass the given subscriber
/// (after any decoration of the stage's own) to its upstream. Callers use
/// [`FlowExt::subscribe`], which applies the boundary decoration first.
pub trait Flow<T: Send + 'static> {
    /// The hook registration point this pipeline was built against.
    fn hooks(&self) -> &Arc<Hooks>;

    /// Subscribe without boundary decoration.
    fn subscribe_raw(self: Box<Self>, subscriber: BoxSubscriber<T>);
}

/// Combinators over [`Flow`] stages.
pub trait FlowExt<T: Send + 'static>: Flow<T> + Sized + 'static {
    /// Transform every item with `mapper`.
    fn map<U, M>(self, mapper: M) -> Map<T, U, Self, M>
    where
        U: Send + 'static,
        M: FnMut(T) -> U + Send + 'static,
    {
        Map::new(self, mapper)
    }

    /// Drop items for which `predicate` returns false.
    fn filter<P>(self, predicate: P) -> Filter<T, Self, P>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        Filter::new(self, predicate)
    }

    /// Enrich the flow context seen by stages upstream of this point.
    fn context_write<W>(self, writer: W) -> ContextWrite<T, Self, W>
    where
        W: FnOnce(FlowContext) -> FlowContext + Send + 'static,
    {
        ContextWrite::new(self, writer)
    }

    /// Carry `context` in the flow context seen upstream. This is how a
    /// trace context set outside the pipeline becomes visible inside it.
    #[allow(clippy::type_complexity)]
    fn with_trace_context(self, context: TraceContext) -> ContextWrite<T, Self, Box<dyn FnOnce(FlowContext) -> FlowContext + Send>> {
        ContextWrite::new(self, Box::new(move |flow_context: FlowContext| flow_context.with(context)))
    }

    /// Re-deliver every signal on a dedicated thread that is *not* mediated
    /// by the scheduler wrapper. Under boundary-only instrumentation the
    /// ambient context does not survive this hop; that is the documented
    /// trade-off, not a defect to paper over.
    fn thread_hop(self) -> ThreadHop<T, Self>
    where
        T: 'static,
    {
        ThreadHop::new(self)
    }

    /// Re-deliver every signal as a task on `worker`. Submitting through a
    /// [`TraceWorker`](crate::scheduler::TraceWorker) carries the ambient
    /// context across the hop.
    fn publish_on(self, worker: Arc<dyn Worker>) -> PublishOn<T, Self>
    where
        T: 'static,
    {
        PublishOn::new(self, worker)
    }

    /// Subscribe the terminal consumer, applying boundary decoration.
    fn subscribe<S>(self, subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        let hooks = self.hooks().clone();
        let subscriber = hooks.decorate_last(Box::new(subscriber) as BoxSubscriber<T>);
        Box::new(self).subscribe_raw(subscriber);
    }
}

impl<T: Send + 'static, F: Flow<T> + 'static> FlowExt<T> for F {}
