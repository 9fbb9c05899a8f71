//! In-process hub that records every batch it receives.
//!
//! Params: `latency_ms` delays each send, `fail_every=N` fails every Nth
//! batch (1-based) with `TransportError::Send`.

use crate::event::Event;
use crate::transport::{ConnectOptions, HubClient, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    batches: Mutex<Vec<Vec<Event>>>,
    attempts: AtomicU64,
    closed: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockHub {
    inner: Arc<Inner>,
    latency: Option<Duration>,
    fail_every: Option<u64>,
}

pub async fn connect(opts: ConnectOptions) -> Result<Box<dyn HubClient>, TransportError> {
    Ok(Box::new(MockHub::new(&opts)?))
}

impl MockHub {
    pub fn new(opts: &ConnectOptions) -> Result<Self, TransportError> {
        let latency = match opts.params.get("latency_ms") {
            Some(v) => Some(Duration::from_millis(v.parse().map_err(|_| {
                TransportError::Connect(format!("invalid latency_ms: {v}"))
            })?)),
            None => None,
        };
        let fail_every = match opts.params.get("fail_every") {
            Some(v) => Some(
                v.parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| TransportError::Connect(format!("invalid fail_every: {v}")))?,
            ),
            None => None,
        };
        Ok(Self {
            inner: Arc::default(),
            latency,
            fail_every,
        })
    }

    /// Batches accepted so far, in arrival order.
    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.inner.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn event_count(&self) -> usize {
        self.batches().iter().map(Vec::len).sum()
    }

    /// Send attempts, including failed ones.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HubClient for MockHub {
    async fn send_batch(&self, events: &[Event]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        if let Some(n) = self.fail_every {
            if attempt % n == 0 {
                return Err(TransportError::Send(format!("injected failure on batch {attempt}")));
            }
        }
        self.inner
            .batches
            .lock()
            .map_err(|e| TransportError::Other(e.to_string()))?
            .push(events.to_vec());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }
}
