//! Concurrent dispatch of a partition: one task per populated worker queue.
//!
//! Each worker sends its chunks strictly in order. When its queue is drained
//! it reports to the dispatcher and then parks until the run-wide shutdown
//! fires, so it keeps its client handle alive until the caller cancels.
//! `dispatch` returns as soon as every launched worker has reported.

use super::partition::{BatchQueue, Partition};
use crate::event::Event;
use crate::shutdown::ShutdownRx;
use crate::transport::{HubClient, TransportError};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Progress hooks invoked by the dispatcher. All methods default to no-ops.
pub trait DispatchObserver: Send + Sync {
    /// Called on the dispatching side before worker `worker` is launched.
    fn before_send_batch(&self, _total_events: usize, _worker: usize) {}
    /// Called by a worker after every send attempt, successful or not.
    fn after_send_batch(&self, _chunk_events: usize, _worker: usize) {}
    /// Outcome and latency of one send attempt of `events` events.
    fn send_result(
        &self,
        _worker: usize,
        _events: usize,
        _elapsed: Duration,
        _error: Option<&TransportError>,
    ) {
    }
}

pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{queues} populated queues but only {workers} workers")]
    TooFewWorkers { workers: usize, queues: usize },
}

/// A chunk the hub did not accept. Failed chunks are not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub worker: usize,
    pub chunk: usize,
    pub events: usize,
    pub error: TransportError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub chunks_sent: usize,
    pub events_sent: usize,
    pub failures: Vec<SendFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// One entry per launched worker, ordered by worker index
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
}

impl DispatchReport {
    pub fn events_sent(&self) -> usize {
        self.workers.iter().map(|w| w.events_sent).sum()
    }

    pub fn chunks_sent(&self) -> usize {
        self.workers.iter().map(|w| w.chunks_sent).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SendFailure> {
        self.workers.iter().flat_map(|w| w.failures.iter())
    }

    pub fn events_failed(&self) -> usize {
        self.failures().map(|f| f.events).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Result of a dispatch whose workers may still be parked on shutdown.
pub struct DispatchOutcome {
    pub report: DispatchReport,
    lingering: Vec<JoinHandle<()>>,
}

impl DispatchOutcome {
    /// Wait until every worker has observed shutdown and exited.
    pub async fn wait_for_teardown(self) -> DispatchReport {
        for res in join_all(self.lingering).await {
            if let Err(e) = res {
                error!(error = %e, "dispatch worker ended abnormally");
            }
        }
        self.report
    }
}

pub struct Dispatcher {
    client: Arc<dyn HubClient>,
    observer: Arc<dyn DispatchObserver>,
    send_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn HubClient>) -> Self {
        Self {
            client,
            observer: Arc::new(NoopObserver),
            send_timeout: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound every individual batch send.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Send every queue of `partition` concurrently and wait until each
    /// launched worker has drained its queue.
    pub async fn dispatch(
        &self,
        partition: Partition,
        worker_count: usize,
        shutdown: ShutdownRx,
    ) -> Result<DispatchOutcome, DispatchError> {
        if partition.len() > worker_count {
            return Err(DispatchError::TooFewWorkers {
                workers: worker_count,
                queues: partition.len(),
            });
        }

        let started = Instant::now();
        let launch: Vec<(usize, BatchQueue)> = partition
            .into_queues()
            .into_iter()
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .collect();
        let expected = launch.len();

        // Completion barrier: capacity covers every worker so reporting never blocks.
        let (done_tx, done_rx) = flume::bounded::<WorkerReport>(expected.max(1));
        let mut lingering = Vec::with_capacity(expected);

        for (worker, queue) in launch {
            self.observer.before_send_batch(queue.total_events(), worker);
            debug!(worker, chunks = queue.len(), events = queue.total_events(), "launching worker");
            lingering.push(tokio::spawn(run_worker(
                worker,
                queue,
                self.client.clone(),
                self.observer.clone(),
                self.send_timeout,
                done_tx.clone(),
                shutdown.clone(),
            )));
        }
        drop(done_tx);

        let mut workers = Vec::with_capacity(expected);
        while workers.len() < expected {
            match done_rx.recv_async().await {
                Ok(report) => workers.push(report),
                Err(_) => {
                    error!(
                        reported = workers.len(),
                        expected, "dispatch workers exited without reporting"
                    );
                    break;
                }
            }
        }
        workers.sort_by_key(|w| w.worker);

        let report = DispatchReport {
            workers,
            elapsed: started.elapsed(),
        };
        info!(
            workers = expected,
            events = report.events_sent(),
            chunks = report.chunks_sent(),
            failed_events = report.events_failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "dispatch complete"
        );
        Ok(DispatchOutcome { report, lingering })
    }
}

async fn run_worker(
    worker: usize,
    queue: BatchQueue,
    client: Arc<dyn HubClient>,
    observer: Arc<dyn DispatchObserver>,
    send_timeout: Option<Duration>,
    done: flume::Sender<WorkerReport>,
    mut shutdown: ShutdownRx,
) {
    let mut report = WorkerReport {
        worker,
        ..Default::default()
    };

    for (idx, chunk) in queue.chunks().iter().enumerate() {
        tokio::task::yield_now().await;
        let started = Instant::now();
        let res = send_chunk(client.as_ref(), chunk, send_timeout, &mut shutdown).await;
        observer.send_result(worker, chunk.len(), started.elapsed(), res.as_ref().err());
        match res {
            Ok(()) => {
                report.chunks_sent += 1;
                report.events_sent += chunk.len();
            }
            Err(error) => {
                warn!(worker, chunk = idx, events = chunk.len(), %error, "batch send failed");
                report.failures.push(SendFailure {
                    worker,
                    chunk: idx,
                    events: chunk.len(),
                    error,
                });
            }
        }
        observer.after_send_batch(chunk.len(), worker);
    }

    let _ = done.send(report);
    shutdown.cancelled().await;
    debug!(worker, "worker released by shutdown");
}

async fn send_chunk(
    client: &dyn HubClient,
    chunk: &[Event],
    send_timeout: Option<Duration>,
    shutdown: &mut ShutdownRx,
) -> Result<(), TransportError> {
    if shutdown.is_shutdown() {
        return Err(TransportError::Cancelled);
    }
    let send = async {
        match send_timeout {
            Some(t) => tokio::time::timeout(t, client.send_batch(chunk))
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => client.send_batch(chunk).await,
        }
    };
    tokio::select! {
        res = send => res,
        _ = shutdown.cancelled() => Err(TransportError::Cancelled),
    }
}
