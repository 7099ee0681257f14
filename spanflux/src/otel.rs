// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! OpenTelemetry bridge for the ambient-store seam.
//!
//! [`OtelCurrentTraceContext`] implements [`CurrentTraceContext`] over
//! [`opentelemetry::Context`], whose storage is task-aware rather than
//! thread-bound. Only the store seam is bridged: no spans are created and
//! nothing is exported.

use crate::trace::{CurrentTraceContext, Scope, SpanId, TraceContext, TraceId};
use opentelemetry::trace::{SpanContext, TraceContextExt, TraceFlags, TraceState};
use opentelemetry::Context;

/// Converts an OpenTelemetry span context into a [`TraceContext`].
/// Returns `None` for invalid (all-zero) span contexts.
pub fn from_span_context(span_context: &SpanContext) -> Option<TraceContext> {
    if !span_context.is_valid() {
        return None;
    }
    let trace_id = TraceId::from(u128::from_be_bytes(span_context.trace_id().to_bytes()));
    let span_id = SpanId::from(u64::from_be_bytes(span_context.span_id().to_bytes()));
    Some(TraceContext::new(trace_id, span_id).with_sampled(span_context.is_sampled()))
}

/// Converts a [`TraceContext`] into a remote OpenTelemetry span context.
/// Baggage entries are not representable on a span context and are dropped.
pub fn to_span_context(context: &TraceContext) -> SpanContext {
    let flags = match context.sampled() {
        Some(true) => TraceFlags::SAMPLED,
        _ => TraceFlags::default(),
    };
    SpanContext::new(
        opentelemetry::trace::TraceId::from_bytes(u128::from(context.trace_id()).to_be_bytes()),
        opentelemetry::trace::SpanId::from_bytes(u64::from(context.span_id()).to_be_bytes()),
        flags,
        true,
        TraceState::default(),
    )
}

/// A [`CurrentTraceContext`] backed by [`opentelemetry::Context`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OtelCurrentTraceContext;

impl OtelCurrentTraceContext {
    /// Returns the bridge store.
    pub fn new() -> Self {
        Self
    }
}

impl CurrentTraceContext for OtelCurrentTraceContext {
    fn context(&self) -> Option<TraceContext> {
        let current = Context::current();
        from_span_context(current.span().span_context())
    }

    fn maybe_scope(&self, context: Option<TraceContext>) -> Scope {
        let Some(next) = context else {
            return Scope::noop();
        };
        if self.context().as_ref() == Some(&next) {
            return Scope::noop();
        }
        let attached = Context::current().with_remote_span_context(to_span_context(&next));
        let guard = attached.attach();
        Scope::closing(move || drop(guard))
    }
}
