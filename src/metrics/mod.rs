pub mod observer;
pub mod stats;
