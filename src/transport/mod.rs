//! Hub client abstraction: trait, errors, and builder factory.

pub mod config;
#[cfg(any(test, feature = "transport-mock"))]
pub mod mock;
#[cfg(feature = "transport-mqtt")]
pub mod mqtt;

use crate::event::Event;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Mqtt,
    #[cfg(any(test, feature = "transport-mock"))]
    Mock,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub params: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("send: {0}")]
    Send(String),
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("disconnected")]
    Disconnected,
    #[error("other: {0}")]
    Other(String),
}

/// Client for the message hub. Shared by every dispatch worker, so
/// implementations must tolerate concurrent `send_batch` calls.
#[async_trait::async_trait]
pub trait HubClient: Send + Sync {
    /// Send one chunk of events as a single batch.
    async fn send_batch(&self, events: &[Event]) -> Result<(), TransportError>;
    async fn shutdown(&self) -> Result<(), TransportError>;
    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct TransportBuilder;

impl TransportBuilder {
    pub async fn connect(
        engine: Engine,
        opts: ConnectOptions,
    ) -> Result<Box<dyn HubClient>, TransportError> {
        match engine {
            Engine::Mqtt => {
                #[cfg(feature = "transport-mqtt")]
                {
                    return crate::transport::mqtt::connect(opts).await;
                }
                #[cfg(not(feature = "transport-mqtt"))]
                {
                    let _ = opts;
                    Err(TransportError::Connect("mqtt feature disabled".into()))
                }
            }
            #[cfg(any(test, feature = "transport-mock"))]
            Engine::Mock => crate::transport::mock::connect(opts).await,
        }
    }
}
