//! Synthesis, partitioning and concurrent dispatch of event batches.

pub mod dispatch;
pub mod partition;
pub mod synth;

pub use dispatch::{
    DispatchError, DispatchObserver, DispatchOutcome, DispatchReport, Dispatcher, NoopObserver,
    SendFailure, WorkerReport,
};
pub use partition::{BatchQueue, Chunk, Partition, PartitionError, partition, partition_from_pool};
pub use synth::{EventSynthesizer, MessageTemplate};
