// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use clap::Parser;
use service::init_tracing;
use spanflux::scheduler::{Scheduler, TokioScheduler, TraceScheduler};
use spanflux::{CurrentTraceContext, ThreadLocalCurrentTraceContext, TraceContext};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
struct Flags {
    /// How many tasks to submit.
    #[clap(long, default_value_t = 4)]
    tasks: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = Flags::parse();
    init_tracing("Spanflux Example Scheduler")?;

    let store: Arc<dyn CurrentTraceContext> = Arc::new(ThreadLocalCurrentTraceContext::new());
    let scheduler = TraceScheduler::new(TokioScheduler::current(), store.clone());
    let worker = scheduler.create_worker();
    let probe = ThreadLocalCurrentTraceContext::new();

    let (sender, receiver) = channel();
    for task in 0..flags.tasks {
        // Each submission happens under its own trace; the worker thread
        // must observe exactly the submitter's context, task by task.
        let context = TraceContext::random();
        let _scope = store.maybe_scope(Some(context.clone()));
        let sender = sender.clone();
        worker.schedule(Box::new(move || {
            let observed = probe.context();
            sender.send((task, context, observed)).unwrap();
        }));
    }
    drop(sender);

    let received = tokio::task::spawn_blocking(move || {
        let mut received = Vec::new();
        while let Ok(entry) = receiver.recv_timeout(Duration::from_secs(5)) {
            received.push(entry);
        }
        received
    })
    .await?;

    for (task, submitted, observed) in received {
        match observed {
            Some(observed) if observed == submitted => {
                tracing::info!("task {task} observed its submitter's trace {}", observed.trace_id())
            },
            other => tracing::warn!("task {task} observed {:?} instead of trace {}", other, submitted.trace_id()),
        }
    }
    tracing::info!("scheduler demo complete");
    Ok(())
}
