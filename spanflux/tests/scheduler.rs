use spanflux::flow::{self, FlowExt};
use spanflux::scheduler::{Scheduler, ThreadScheduler, TokioScheduler, TraceScheduler};
use spanflux::{
    CallbackSubscriber, CurrentTraceContext, Hooks, Instrumentation, InstrumentationMode, PropagationConfig,
    ThreadLocalCurrentTraceContext, TraceContext,
};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn thread_local_store() -> Arc<dyn CurrentTraceContext> {
    Arc::new(ThreadLocalCurrentTraceContext::new())
}

fn ambient() -> Option<TraceContext> {
    ThreadLocalCurrentTraceContext::new().context()
}

#[test]
fn test_task_round_trip_carries_the_submitter_context() {
    let store = thread_local_store();
    let scheduler = TraceScheduler::new(ThreadScheduler::new(), store.clone());
    let context = TraceContext::random();
    let submitting_thread = thread::current().id();

    let (sender, receiver) = channel();
    {
        let _ambient = store.maybe_scope(Some(context.clone()));
        scheduler.schedule(Box::new(move || {
            sender.send((ambient(), thread::current().id())).unwrap();
        }));
    }

    let (observed, executing_thread) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(observed, Some(context));
    assert_ne!(executing_thread, submitting_thread);
}

#[test]
fn test_reused_worker_thread_does_not_leak_across_tasks() {
    let store = thread_local_store();
    let scheduler = TraceScheduler::new(ThreadScheduler::new(), store.clone());
    let worker = scheduler.create_worker();
    let context = TraceContext::random();

    let (sender, receiver) = channel();

    // First task: submitted under a context.
    {
        let _ambient = store.maybe_scope(Some(context.clone()));
        let sender = sender.clone();
        worker.schedule(Box::new(move || {
            sender.send(ambient()).unwrap();
        }));
    }
    // Second task: submitted with no context, on the same worker thread.
    {
        let sender = sender.clone();
        worker.schedule(Box::new(move || {
            sender.send(ambient()).unwrap();
        }));
    }
    // Third task: reads whatever the worker thread's ambient state is
    // between wrapped tasks; a leak from the first task would show here.
    worker.schedule(Box::new(move || {
        sender.send(ambient()).unwrap();
    }));

    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), Some(context));
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), None);
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), None);
}

#[test]
fn test_delayed_and_periodic_tasks_carry_the_submitter_context() {
    let store = thread_local_store();
    let scheduler = TraceScheduler::new(ThreadScheduler::new(), store.clone());
    let context = TraceContext::random();

    let (delayed_sender, delayed_receiver) = channel();
    let (periodic_sender, periodic_receiver) = channel();
    let handle = {
        let _ambient = store.maybe_scope(Some(context.clone()));
        scheduler.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                delayed_sender.send(ambient()).unwrap();
            }),
        );
        scheduler.schedule_periodic(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Arc::new(move || {
                let _ = periodic_sender.send(ambient());
            }),
        )
    };

    assert_eq!(delayed_receiver.recv_timeout(Duration::from_secs(5)).unwrap(), Some(context.clone()));
    assert_eq!(periodic_receiver.recv_timeout(Duration::from_secs(5)).unwrap(), Some(context.clone()));
    assert_eq!(periodic_receiver.recv_timeout(Duration::from_secs(5)).unwrap(), Some(context));
    handle.cancel();
}

#[test]
fn test_mediated_hop_keeps_context_under_boundary_only() {
    let store = thread_local_store();
    let hooks = Arc::new(Hooks::new());
    hooks.install(Instrumentation::with_store(
        PropagationConfig::new().with_mode(InstrumentationMode::WrapBoundaryOnly),
        store.clone(),
    ));
    let scheduler = TraceScheduler::new(ThreadScheduler::new(), store.clone());
    let context = TraceContext::random();

    let (probe_sender, probe_receiver) = channel();
    {
        let _ambient = store.maybe_scope(Some(context.clone()));
        flow::iter(&hooks, vec![1_u32])
            .publish_on(scheduler.create_worker())
            .map(move |item| {
                probe_sender.send(ambient()).unwrap();
                item
            })
            .subscribe(CallbackSubscriber::new(|_item: u32| ()));
    }

    // The trace worker captured the emitting thread's context per signal,
    // so the hop that boundary-only instrumentation cannot cover on its own
    // is closed by the scheduler wrapper.
    let observed = probe_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(observed, Some(context));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_backed_round_trip() {
    let store = thread_local_store();
    let scheduler = TraceScheduler::new(TokioScheduler::current(), store.clone());
    let context = TraceContext::random();

    let (sender, receiver) = channel();
    {
        let _ambient = store.maybe_scope(Some(context.clone()));
        let sender = sender.clone();
        scheduler.schedule(Box::new(move || {
            sender.send(ambient()).unwrap();
        }));
    }
    {
        let worker = scheduler.create_worker();
        let _ambient = store.maybe_scope(Some(context.clone()));
        worker.schedule(Box::new(move || {
            sender.send(ambient()).unwrap();
        }));
    }

    let observed = tokio::task::spawn_blocking(move || {
        (
            receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
            receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
        )
    })
    .await
    .unwrap();
    assert_eq!(observed.0, Some(context.clone()));
    assert_eq!(observed.1, Some(context));
}
