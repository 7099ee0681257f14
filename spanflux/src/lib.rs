// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! spanflux propagates a distributed-tracing context across reactive
//! pipelines and thread hand-offs.
//!
//! The engine snapshots a [`trace::TraceContext`] where a pipeline stage is
//! constructed and restores it as the ambient "current context" around every
//! signal the stage delivers, on whatever thread delivers it. The moving
//! parts:
//!
//! - [`context::FlowContext`]: the immutable map a subscriber chain carries,
//!   independent of the executing thread.
//! - [`subscriber::ScopePassingSubscriber`]: brackets every signal with an
//!   open/forward/close scope against the ambient store.
//! - [`hook::Hooks`]: the injectable interception point every stage
//!   construction routes through, with an explicit install/reset lifecycle
//!   and a three-mode cost/correctness policy
//!   ([`hook::InstrumentationMode`]).
//! - [`scheduler`]: wrappers that carry the submitter's context across
//!   executor hand-offs; [`future`] is the per-poll rendering of the same
//!   discipline and [`queue`] the per-buffered-item one.
//! - [`flow`]: a small instrumented pipeline layer driving all of the above.
//!
//! Tracing-layer faults never alter signal delivery: pipelines degrade to
//! running untraced, they do not fail.

#![deny(missing_docs)]
#![allow(clippy::type_complexity)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
pub mod flow;
pub mod future;
pub mod hook;
pub mod queue;
pub mod scheduler;
pub mod subscriber;
pub mod trace;

#[cfg(feature = "otel")]
#[cfg_attr(docsrs, doc(cfg(feature = "otel")))]
pub mod otel;

pub use context::FlowContext;
pub use future::{Traced, TracedFutureExt};
pub use hook::{
    ConfigError, ContextStoreProvider, DeferredStoreProvider, FixedStoreProvider, Hooks, Instrumentation,
    InstrumentationMode, PropagationConfig, StageKind,
};
pub use subscriber::{
    BoxError, BoxSubscriber, BoxSubscription, CallbackSubscriber, LazySubscriber, ScopePassingSubscriber, Subscriber,
    Subscription,
};
pub use trace::{CurrentTraceContext, Scope, SpanId, StoreHandle, ThreadLocalCurrentTraceContext, TraceContext, TraceId};
