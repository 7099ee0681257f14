// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Context-carrying queue instrumentation.
//!
//! Some stages buffer items in internal queues; an item can be enqueued on
//! one thread and drained on another long after the submitter moved on.
//! [`TraceQueue`] captures the ambient context at `offer` time and restores
//! it, strictly scoped, around the consumer's handling of the item.

use crate::trace::{CurrentTraceContext, TraceContext};
use std::collections::VecDeque;
use std::sync::Arc;

/// One buffered item plus the context that was ambient when it was offered.
#[derive(Debug)]
pub struct Envelope<T> {
    body: T,
    context: Option<TraceContext>,
}

impl<T> Envelope<T> {
    /// The buffered item.
    pub fn body(&self) -> &T {
        &self.body
    }

    /// The context captured at offer time.
    pub fn context(&self) -> Option<&TraceContext> {
        self.context.as_ref()
    }

    /// Unwraps the item, discarding the captured context.
    pub fn into_body(self) -> T {
        self.body
    }
}

/// A FIFO queue whose items carry the offering thread's ambient context.
///
/// `poll_in_scope` is the only draining operation: the captured context is
/// restored around a closure, so the restore is paired with a release on
/// the same call stack. An unpaired "restore and leave it" drain is
/// deliberately not exposed.
pub struct TraceQueue<T> {
    inner: VecDeque<Envelope<T>>,
    store: Arc<dyn CurrentTraceContext>,
}

impl<T> TraceQueue<T> {
    /// Creates an empty queue capturing through `store`.
    pub fn new(store: Arc<dyn CurrentTraceContext>) -> Self {
        Self {
            inner: VecDeque::new(),
            store,
        }
    }

    /// Enqueue `item`, capturing the calling thread's ambient context.
    pub fn offer(&mut self, item: T) {
        let context = self.store.context();
        self.inner.push_back(Envelope { body: item, context });
    }

    /// Dequeue the oldest item and run `handle` with its captured context
    /// ambient. Returns `None` when the queue is empty.
    pub fn poll_in_scope<R>(&mut self, handle: impl FnOnce(T) -> R) -> Option<R> {
        let envelope = self.inner.pop_front()?;
        let _scope = self.store.maybe_scope(envelope.context);
        Some(handle(envelope.body))
    }

    /// Dequeue the oldest item as an [`Envelope`], leaving scoping to the
    /// caller.
    pub fn poll_envelope(&mut self) -> Option<Envelope<T>> {
        self.inner.pop_front()
    }

    /// The oldest envelope without dequeueing it.
    pub fn peek(&self) -> Option<&Envelope<T>> {
        self.inner.front()
    }

    /// The number of buffered items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
