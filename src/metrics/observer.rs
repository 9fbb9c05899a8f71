//! Dispatch observer that feeds [`Stats`] through a channel.
//!
//! Dispatch callbacks are synchronous and fire from many workers, so they
//! only enqueue; a single stats worker applies the updates.

use crate::batch::DispatchObserver;
use crate::metrics::stats::Stats;
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

enum Ev {
    Sent { events: u64, latency_ns: u64 },
    Err { events: u64 },
    Flush(oneshot::Sender<()>),
}

pub struct StatsObserver {
    tx: flume::Sender<Ev>,
}

impl StatsObserver {
    /// Start the stats worker for `stats`.
    pub fn spawn(stats: Arc<Stats>) -> Arc<Self> {
        let (tx, rx) = flume::unbounded::<Ev>();
        tokio::spawn(async move {
            while let Ok(ev) = rx.recv_async().await {
                match ev {
                    Ev::Sent { events, latency_ns } => stats.record_batch(events, latency_ns).await,
                    Ev::Err { events } => stats.record_error(events).await,
                    Ev::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Arc::new(Self { tx })
    }

    /// Wait until every update queued so far has been applied.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Ev::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl DispatchObserver for StatsObserver {
    fn before_send_batch(&self, total_events: usize, worker: usize) {
        info!(worker, events = total_events, "worker assigned");
    }

    fn send_result(
        &self,
        _worker: usize,
        events: usize,
        elapsed: Duration,
        error: Option<&TransportError>,
    ) {
        let ev = match error {
            None => Ev::Sent {
                events: events as u64,
                latency_ns: elapsed.as_nanos() as u64,
            },
            Some(_) => Ev::Err {
                events: events as u64,
            },
        };
        let _ = self.tx.send(ev);
    }
}
