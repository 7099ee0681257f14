// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Shared pieces for the spanflux example binaries.

use spanflux::{CurrentTraceContext, Hooks, Instrumentation, PropagationConfig, ThreadLocalCurrentTraceContext};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber so the library's `[SPANFLUX]` diagnostics are
/// visible. `RUST_LOG` overrides the default filter.
pub fn init_tracing(service_name: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,spanflux=trace")))
        .init();
    tracing::info!("{service_name} starting");
    Ok(())
}

/// Build a hook registration point with the given mode installed over the
/// thread-local store, failing fast on an unknown mode string.
pub fn install_hooks(mode: &str) -> anyhow::Result<(Arc<Hooks>, Arc<dyn CurrentTraceContext>)> {
    let config = PropagationConfig::new().with_mode_str(mode)?;
    let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
    let hooks = Arc::new(Hooks::new());
    hooks.install(Instrumentation::with_store(config, store.clone()));
    Ok((hooks, store))
}
