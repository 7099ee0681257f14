// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Trace identifiers and the ambient "current trace context" store.
//!
//! A trace is logically a tree of causally-related spans. This module carries
//! only what the propagation engine needs from a tracer: an immutable
//! [`TraceContext`] naming the current position in that tree, and the
//! [`CurrentTraceContext`] store that makes one context ambient on the
//! calling thread for a bounded [`Scope`].
//!
//! The "current context" is conceptually scoped to the *logical task*, not to
//! the OS thread. [`ThreadLocalCurrentTraceContext`] is the thread-based
//! fallback; runtimes with task-scoped storage should implement
//! [`CurrentTraceContext`] over that storage instead (see the `otel` feature).

use crate::context::FlowContext;
use faststr::FastStr;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// A 128-bit identifier shared by every span in one trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(u128);

impl TraceId {
    /// Returns a random trace id.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<TraceId> for u128 {
    fn from(id: TraceId) -> Self {
        id.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A 64-bit identifier of a single span within a trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(u64);

impl SpanId {
    /// Returns a random span id.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<SpanId> for u64 {
    fn from(id: SpanId) -> Self {
        id.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An immutable trace context: trace id, span id, sampling flag and baggage.
///
/// Produced by a tracer; this engine only reads it and moves it around.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    sampled: Option<bool>,
    baggage: Vec<(FastStr, FastStr)>,
}

impl TraceContext {
    /// Creates a context with no sampling decision and empty baggage.
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            sampled: None,
            baggage: Vec::new(),
        }
    }

    /// Creates a context with random trace and span ids.
    pub fn random() -> Self {
        Self::new(TraceId::random(), SpanId::random())
    }

    /// Set the sampling decision.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = Some(sampled);
        self
    }

    /// Add a baggage entry, replacing any previous entry with the same key.
    pub fn with_baggage(mut self, key: impl Into<FastStr>, value: impl Into<FastStr>) -> Self {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.baggage.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.baggage.push((key, value));
        }
        self
    }

    /// The trace id.
    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span id.
    #[inline]
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The sampling decision, if one was made.
    #[inline]
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// The baggage entries.
    #[inline]
    pub fn baggage(&self) -> &[(FastStr, FastStr)] {
        &self.baggage
    }

    /// Look up one baggage value by key.
    pub fn baggage_value(&self, key: &str) -> Option<&FastStr> {
        self.baggage.iter().find(|(k, _)| k.as_str() == key).map(|(_, v)| v)
    }
}

/// A guard that restores the prior ambient state when dropped.
///
/// The restore is unconditional: it runs on drop, so the open/close pairing
/// holds under early returns and panics alike. Scopes are thread-affine and
/// must be closed on the thread that opened them; they nest LIFO.
#[must_use = "dropping the scope is what restores the prior context"]
pub struct Scope {
    restore: Option<Box<dyn FnOnce()>>,
}

impl Scope {
    /// A scope with nothing to restore.
    #[inline]
    pub fn noop() -> Self {
        Self { restore: None }
    }

    /// A scope that runs `restore` when dropped.
    pub fn closing(restore: impl FnOnce() + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }

    /// Whether this scope will restore anything on drop.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.restore.is_none()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("noop", &self.is_noop()).finish()
    }
}

/// Per-thread storage for the trace context currently in effect.
///
/// This is the seam between the propagation engine and a concrete tracer.
/// Implementations must never let a failure here alter signal delivery;
/// tracing degrades silently, business logic is never affected.
pub trait CurrentTraceContext: Send + Sync {
    /// Read the ambient context on the calling thread, if any.
    fn context(&self) -> Option<TraceContext>;

    /// Open a scope that makes `context` ambient until the returned guard is
    /// dropped.
    ///
    /// `None` is a no-op: an absent context is never forced over an existing
    /// one. Passing the context that is already current is also a no-op.
    fn maybe_scope(&self, context: Option<TraceContext>) -> Scope;
}

/// A cloneable handle to a [`CurrentTraceContext`], storable in a
/// [`FlowContext`].
///
/// Under manual instrumentation the boundary decorator binds one of these
/// into the flow context so that downstream code can reach the store without
/// any ambient registration.
#[derive(Clone)]
pub struct StoreHandle(Arc<dyn CurrentTraceContext>);

impl StoreHandle {
    /// Wraps a store.
    pub fn new(store: Arc<dyn CurrentTraceContext>) -> Self {
        Self(store)
    }

    /// The wrapped store.
    pub fn store(&self) -> Arc<dyn CurrentTraceContext> {
        self.0.clone()
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}

/// Like [`CurrentTraceContext::context`], except it first checks the flow
/// context carried by the subscriber chain.
pub fn parent_from(context: &FlowContext, fallback: &dyn CurrentTraceContext) -> Option<TraceContext> {
    if let Some(parent) = context.get::<TraceContext>() {
        return Some((*parent).clone());
    }
    fallback.context()
}

thread_local! {
    static AMBIENT: RefCell<Option<TraceContext>> = const { RefCell::new(None) };
}

/// The default [`CurrentTraceContext`], backed by a thread-local slot.
///
/// All instances share the same per-thread slot; the store is logically
/// process-wide, scoped per thread. The scheduler wrapper is what re-binds
/// the slot across thread hand-offs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadLocalCurrentTraceContext;

impl ThreadLocalCurrentTraceContext {
    /// Returns the thread-local store.
    pub fn new() -> Self {
        Self
    }
}

impl CurrentTraceContext for ThreadLocalCurrentTraceContext {
    fn context(&self) -> Option<TraceContext> {
        AMBIENT.with(|slot| slot.borrow().clone())
    }

    fn maybe_scope(&self, context: Option<TraceContext>) -> Scope {
        let Some(next) = context else {
            return Scope::noop();
        };
        let replaced = AMBIENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.as_ref() == Some(&next) {
                return None;
            }
            Some(std::mem::replace(&mut *slot, Some(next)))
        });
        match replaced {
            None => Scope::noop(),
            Some(prev) => Scope::closing(move || {
                AMBIENT.with(|slot| *slot.borrow_mut() = prev);
            }),
        }
    }
}
