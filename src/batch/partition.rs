//! Splits a run of `total` events into per-worker queues of send-sized chunks.
//!
//! Chunks are handed out round-robin, one per worker per pass. Once fewer
//! than `limit` events remain, the remainder becomes one final chunk on the
//! highest-indexed queue built so far and partitioning stops. Events are
//! produced lazily, one chunk at a time.

use super::synth::{EventSynthesizer, MessageTemplate};
use crate::event::Event;
use tracing::debug;

/// One network send unit.
pub type Chunk = Vec<Event>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PartitionError {
    #[error("batch limit must be greater than zero")]
    ZeroLimit,
    #[error("worker count must be greater than zero")]
    ZeroWorkers,
    #[error("event pool is empty")]
    EmptyPool,
}

/// Ordered chunks assigned to one worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchQueue {
    chunks: Vec<Chunk>,
}

impl BatchQueue {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of events over all chunks.
    pub fn total_events(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    fn push(&mut self, chunk: Chunk) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }
}

/// Frozen worker assignment: index `i` holds worker `i`'s queue.
///
/// Only the partitioning functions build one, so a dispatcher never sees a
/// queue that is still being filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    queues: Vec<BatchQueue>,
}

impl Partition {
    /// Number of populated worker queues.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn queue(&self, worker: usize) -> Option<&BatchQueue> {
        self.queues.get(worker)
    }

    pub fn queues(&self) -> &[BatchQueue] {
        &self.queues
    }

    pub fn total_events(&self) -> usize {
        self.queues.iter().map(BatchQueue::total_events).sum()
    }

    pub fn total_chunks(&self) -> usize {
        self.queues.iter().map(BatchQueue::len).sum()
    }

    pub fn into_queues(self) -> Vec<BatchQueue> {
        self.queues
    }
}

/// Where partitioning pulls its events from.
trait EventSource {
    fn take(&mut self, n: u64) -> Chunk;
}

impl EventSource for EventSynthesizer {
    fn take(&mut self, n: u64) -> Chunk {
        self.synthesize(n, n)
    }
}

struct PoolReplay<'a> {
    pool: &'a [Event],
    offset: usize,
}

impl EventSource for PoolReplay<'_> {
    fn take(&mut self, n: u64) -> Chunk {
        let len = self.pool.len();
        let chunk = (0..n as usize)
            .map(|k| self.pool[(self.offset + k) % len].clone())
            .collect();
        self.offset = (self.offset + n as usize) % len;
        chunk
    }
}

/// Partition `total` synthesized events across up to `worker_count` queues.
pub fn partition(
    worker_count: usize,
    limit: u64,
    total: u64,
    template: &MessageTemplate,
) -> Result<Partition, PartitionError> {
    let mut synth = EventSynthesizer::new(template.clone());
    build(&mut synth, worker_count, limit, total)
}

/// Partition `total` events replayed from `pool`, wrapping to its start as needed.
pub fn partition_from_pool(
    pool: &[Event],
    worker_count: usize,
    limit: u64,
    total: u64,
) -> Result<Partition, PartitionError> {
    if pool.is_empty() && total > 0 {
        return Err(PartitionError::EmptyPool);
    }
    let mut replay = PoolReplay { pool, offset: 0 };
    build(&mut replay, worker_count, limit, total)
}

fn build<S: EventSource>(
    source: &mut S,
    worker_count: usize,
    limit: u64,
    total: u64,
) -> Result<Partition, PartitionError> {
    if limit == 0 {
        return Err(PartitionError::ZeroLimit);
    }
    if worker_count == 0 {
        return Err(PartitionError::ZeroWorkers);
    }

    let mut queues: Vec<BatchQueue> = Vec::new();
    if total == 0 {
        return Ok(Partition { queues });
    }

    let passes = total.div_ceil(limit).div_ceil(worker_count as u64);
    let mut queued = 0u64;

    'passes: for _ in 0..passes {
        for worker in 0..worker_count {
            if queues.len() <= worker {
                queues.push(BatchQueue::default());
            }
            let chunk = source.take(limit.min(total - queued));
            queued += chunk.len() as u64;
            queues[worker].push(chunk);

            if total - queued <= limit {
                let left = total - queued;
                if left > 0 {
                    let tail = source.take(left);
                    queued += tail.len() as u64;
                    if let Some(last) = queues.last_mut() {
                        last.push(tail);
                    }
                }
                break 'passes;
            }
        }
    }

    let partition = Partition { queues };
    debug!(
        workers = partition.len(),
        chunks = partition.total_chunks(),
        events = queued,
        "partition built"
    );
    Ok(partition)
}
