#![cfg(feature = "transport-mock")]
use hub_bench::batch::{
    DispatchError, DispatchObserver, Dispatcher, MessageTemplate, partition, partition_from_pool,
};
use hub_bench::event::Event;
use hub_bench::shutdown::create_shutdown_channel;
use hub_bench::transport::mock::MockHub;
use hub_bench::transport::{ConnectOptions, TransportError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn hub(opts: ConnectOptions) -> (MockHub, Dispatcher) {
    let hub = MockHub::new(&opts).expect("mock hub");
    let dispatcher = Dispatcher::new(Arc::new(hub.clone()));
    (hub, dispatcher)
}

fn suffixed(body: &str) -> MessageTemplate {
    MessageTemplate {
        add_suffix: true,
        ..MessageTemplate::new(body)
    }
}

#[tokio::test]
async fn every_event_reaches_the_hub() {
    let (hub, dispatcher) = hub(ConnectOptions::default());
    let p = partition(2, 3, 10, &suffixed("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();

    let outcome = dispatcher.dispatch(p, 2, rx).await.expect("dispatch");
    assert_eq!(outcome.report.events_sent(), 10);
    assert_eq!(outcome.report.chunks_sent(), 4);
    assert!(outcome.report.is_clean());
    assert_eq!(hub.event_count(), 10);

    tx.shutdown();
    let report = outcome.wait_for_teardown().await;
    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.workers[0].events_sent, 6);
    assert_eq!(report.workers[1].events_sent, 4);
}

#[tokio::test]
async fn single_short_chunk_launches_one_worker() {
    let (hub, dispatcher) = hub(ConnectOptions::default());
    let p = partition(4, 10, 5, &MessageTemplate::new("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 4, rx).await.expect("dispatch");
    assert_eq!(outcome.report.workers.len(), 1);
    assert_eq!(hub.batches().iter().map(Vec::len).collect::<Vec<_>>(), vec![5]);
    tx.shutdown();
    outcome.wait_for_teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chunks_keep_partition_order_within_a_worker() {
    let (hub, dispatcher) = hub(ConnectOptions::default().with("latency_ms", "1"));
    let p = partition(3, 4, 50, &suffixed("m")).expect("partition");
    let expected = p.clone();
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 3, rx).await.expect("dispatch");
    tx.shutdown();
    outcome.wait_for_teardown().await;

    let arrived = hub.batches();
    for queue in expected.queues() {
        let positions: Vec<usize> = queue
            .chunks()
            .iter()
            .map(|c| arrived.iter().position(|b| b == c).expect("chunk delivered"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
    }
}

#[tokio::test]
async fn workers_park_until_shutdown() {
    let (_hub, dispatcher) = hub(ConnectOptions::default());
    let p = partition(2, 2, 8, &MessageTemplate::new("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 2, rx).await.expect("dispatch");

    let teardown = tokio::spawn(outcome.wait_for_teardown());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!teardown.is_finished());

    tx.shutdown();
    let report = tokio::time::timeout(Duration::from_secs(1), teardown)
        .await
        .expect("released by shutdown")
        .expect("join");
    assert_eq!(report.events_sent(), 8);
}

#[derive(Default)]
struct Recorder {
    before: Mutex<Vec<(usize, usize)>>,
    after: Mutex<Vec<(usize, usize)>>,
}

impl DispatchObserver for Recorder {
    fn before_send_batch(&self, total_events: usize, worker: usize) {
        self.before.lock().unwrap().push((total_events, worker));
    }

    fn after_send_batch(&self, chunk_events: usize, worker: usize) {
        self.after.lock().unwrap().push((chunk_events, worker));
    }
}

#[tokio::test]
async fn observer_sees_every_worker_and_chunk() {
    let (_hub, dispatcher) = hub(ConnectOptions::default().with("fail_every", "3"));
    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher.with_observer(recorder.clone());
    let p = partition(2, 3, 10, &MessageTemplate::new("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 2, rx).await.expect("dispatch");
    tx.shutdown();
    outcome.wait_for_teardown().await;

    let mut before = recorder.before.lock().unwrap().clone();
    before.sort_by_key(|b| b.1);
    assert_eq!(before, vec![(6, 0), (4, 1)]);

    // after-send fires for attempted sends too
    let after = recorder.after.lock().unwrap().clone();
    assert_eq!(after.len(), 4);
    assert_eq!(after.iter().map(|a| a.0).sum::<usize>(), 10);
    for w in 0..2 {
        let sizes: Vec<usize> = after.iter().filter(|a| a.1 == w).map(|a| a.0).collect();
        assert_eq!(sizes, if w == 0 { vec![3, 3] } else { vec![3, 1] });
    }
}

// Failed sends are surfaced in the report but never retried; the run carries on.
#[tokio::test]
async fn send_failures_are_reported_and_not_retried() {
    let (hub, dispatcher) = hub(ConnectOptions::default().with("fail_every", "2"));
    let p = partition(1, 5, 20, &MessageTemplate::new("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 1, rx).await.expect("dispatch");
    tx.shutdown();
    let report = outcome.wait_for_teardown().await;

    assert_eq!(hub.attempts(), 4);
    assert_eq!(report.chunks_sent(), 2);
    assert_eq!(report.failures().count(), 2);
    assert_eq!(report.events_sent() + report.events_failed(), 20);
    let failed: Vec<usize> = report.failures().map(|f| f.chunk).collect();
    assert_eq!(failed, vec![1, 3]);
    assert!(report.failures().all(|f| matches!(f.error, TransportError::Send(_))));
}

#[tokio::test]
async fn cancelled_run_fails_fast_and_completes() {
    let (hub, dispatcher) = hub(ConnectOptions::default());
    let p = partition(2, 2, 9, &MessageTemplate::new("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    tx.shutdown();
    let outcome = dispatcher.dispatch(p, 2, rx).await.expect("dispatch");
    let report = tokio::time::timeout(Duration::from_secs(1), outcome.wait_for_teardown())
        .await
        .expect("teardown without waiting");
    assert_eq!(report.events_sent(), 0);
    assert_eq!(report.events_failed(), 9);
    assert!(report.failures().all(|f| f.error == TransportError::Cancelled));
    assert_eq!(hub.attempts(), 0);
}

#[tokio::test]
async fn slow_sends_time_out() {
    let (_hub, dispatcher) = hub(ConnectOptions::default().with("latency_ms", "200"));
    let dispatcher = dispatcher.with_send_timeout(Duration::from_millis(10));
    let p = partition(1, 4, 4, &MessageTemplate::new("m")).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 1, rx).await.expect("dispatch");
    tx.shutdown();
    let report = outcome.wait_for_teardown().await;
    let errors: Vec<_> = report.failures().map(|f| f.error.clone()).collect();
    assert_eq!(errors, vec![TransportError::Timeout]);
}

#[tokio::test]
async fn more_queues_than_workers_is_rejected() {
    let (_hub, dispatcher) = hub(ConnectOptions::default());
    let p = partition(3, 1, 5, &MessageTemplate::new("m")).expect("partition");
    let (_tx, rx) = create_shutdown_channel();
    let err = dispatcher.dispatch(p, 2, rx).await.err();
    assert_eq!(err, Some(DispatchError::TooFewWorkers { workers: 2, queues: 3 }));
}

#[tokio::test]
async fn replayed_pool_is_sent_in_wrapped_order() {
    let (hub, dispatcher) = hub(ConnectOptions::default());
    let pool: Vec<Event> = (0..3).map(|i| Event::new(format!("e{i}"))).collect();
    let p = partition_from_pool(&pool, 1, 2, 7).expect("partition");
    let (tx, rx) = create_shutdown_channel();
    let outcome = dispatcher.dispatch(p, 1, rx).await.expect("dispatch");
    tx.shutdown();
    outcome.wait_for_teardown().await;

    let bodies: Vec<String> = hub
        .batches()
        .into_iter()
        .flatten()
        .map(|e| String::from_utf8(e.body.to_vec()).unwrap())
        .collect();
    assert_eq!(bodies, vec!["e0", "e1", "e2", "e0", "e1", "e2", "e0"]);
}
