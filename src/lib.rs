//! Load generator for message hubs: synthesizes or replays events, splits
//! them into per-worker batch queues, and sends the batches concurrently.

pub mod batch;
pub mod config;
pub mod event;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod roles;
pub mod shutdown;
pub mod transport;
pub mod wire;
