// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Trace-carrying future adapter.
//!
//! Futures are the logical-task rendering of the ambient store: a spawned
//! task may be polled on many threads over its lifetime, so the context is
//! re-applied as a scope around every poll, exactly as the scheduler
//! wrapper re-applies it around every task execution.

use crate::trace::{CurrentTraceContext, TraceContext};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pin_project! {
    /// A future polled with a fixed trace context ambient.
    ///
    /// The context is captured once, at wrap time; each poll opens a scope
    /// with it and the scope's drop restores the polling thread's prior
    /// state before control returns to the executor.
    pub struct Traced<F> {
        #[pin]
        inner: F,
        store: Arc<dyn CurrentTraceContext>,
        context: Option<TraceContext>,
    }
}

impl<F> Traced<F> {
    /// The context this future is polled under.
    pub fn trace_context(&self) -> Option<&TraceContext> {
        self.context.as_ref()
    }
}

impl<F: Future> Future for Traced<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _scope = this.store.maybe_scope(this.context.clone());
        this.inner.poll(cx)
    }
}

/// Extension methods wrapping futures in a [`Traced`] adapter.
pub trait TracedFutureExt: Future + Sized {
    /// Poll this future with `context` ambient.
    fn with_trace_context(self, store: Arc<dyn CurrentTraceContext>, context: TraceContext) -> Traced<Self> {
        Traced {
            inner: self,
            store,
            context: Some(context),
        }
    }

    /// Poll this future with the context that is ambient right now, the
    /// usual choice at spawn sites.
    fn in_current_trace_context(self, store: Arc<dyn CurrentTraceContext>) -> Traced<Self> {
        let context = store.context();
        Traced {
            inner: self,
            store,
            context,
        }
    }
}

impl<F: Future> TracedFutureExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::ThreadLocalCurrentTraceContext;

    #[test]
    fn test_polls_run_inside_the_captured_context() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let context = TraceContext::random();
        let probe = ThreadLocalCurrentTraceContext::new();

        let expected = context.clone();
        let observed = futures::executor::block_on(
            async move {
                let first = probe.context();
                // Cross an await point; the scope is re-opened per poll.
                futures::future::ready(()).await;
                (first, probe.context())
            }
            .with_trace_context(store.clone(), context),
        );

        assert_eq!(observed.0, Some(expected.clone()));
        assert_eq!(observed.1, Some(expected));
        assert_eq!(store.context(), None);
    }

    #[test]
    fn test_captures_the_ambient_context_at_wrap_time() {
        let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
        let context = TraceContext::random();
        let probe = ThreadLocalCurrentTraceContext::new();

        let future = {
            let _ambient = store.maybe_scope(Some(context.clone()));
            async move { probe.context() }.in_current_trace_context(store.clone())
        };

        // Run outside the wrapping scope: the captured context wins.
        let observed = futures::executor::block_on(future);
        assert_eq!(observed, Some(context));
    }
}
