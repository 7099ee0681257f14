// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use clap::Parser;
use service::{init_tracing, install_hooks};
use spanflux::flow::{self, FlowExt};
use spanflux::{CallbackSubscriber, CurrentTraceContext, ThreadLocalCurrentTraceContext, TraceContext};
use std::sync::mpsc::channel;

#[derive(Parser)]
struct Flags {
    /// Instrumentation mode: wrap-each, wrap-boundary-only or manual.
    #[clap(long, default_value = "wrap-each")]
    mode: String,
    /// How many items to push through the pipeline.
    #[clap(long, default_value_t = 3)]
    count: u32,
}

fn main() -> anyhow::Result<()> {
    let flags = Flags::parse();
    init_tracing("Spanflux Example Pipeline")?;
    let (hooks, _store) = install_hooks(&flags.mode)?;

    let context = TraceContext::random().with_baggage("tenant", "example");
    tracing::info!("pushing {} items under trace {}", flags.count, context.trace_id());

    let probe = ThreadLocalCurrentTraceContext::new();
    let (done_sender, done_receiver) = channel();
    flow::iter(&hooks, 1..=flags.count)
        .map(|item| item * 10)
        .thread_hop()
        .map(move |item| {
            match probe.context() {
                Some(current) => tracing::info!("item {item} delivered under trace {}", current.trace_id()),
                None => tracing::warn!("item {item} delivered with no ambient trace context"),
            }
            item
        })
        .with_trace_context(context)
        .subscribe(
            CallbackSubscriber::new(|item: u32| tracing::info!("consumed {item}"))
                .with_on_complete(move || done_sender.send(()).unwrap()),
        );

    done_receiver.recv()?;
    tracing::info!("pipeline complete");
    Ok(())
}
