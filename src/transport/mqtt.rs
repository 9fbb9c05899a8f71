//! MQTT adapter (feature `transport-mqtt`), using rumqttc (async).
//!
//! Each event of a batch is published as one framed message (see `wire`) on
//! the configured topic. A batch resolves once every publish is queued.
use crate::event::Event;
use crate::transport::{ConnectOptions, HubClient, TransportError};
use crate::wire::encode_event;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct MqttHub {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    poller: JoinHandle<()>,
}

pub async fn connect(opts: ConnectOptions) -> Result<Box<dyn HubClient>, TransportError> {
    let host = opts.params.get("host").cloned().unwrap_or_else(|| "127.0.0.1".into());
    let port: u16 = match opts.params.get("port") {
        Some(p) => p
            .parse()
            .map_err(|_| TransportError::Connect(format!("invalid port: {p}")))?,
        None => 1883,
    };
    let client_id = opts
        .params
        .get("client_id")
        .cloned()
        .unwrap_or_else(|| format!("hub-bench-{}", uuid::Uuid::new_v4()));
    let topic = opts.params.get("topic").cloned().unwrap_or_else(|| "hub-bench/events".into());
    let qos = match opts.params.get("qos").map(String::as_str) {
        None | Some("1") => QoS::AtLeastOnce,
        Some("0") => QoS::AtMostOnce,
        Some("2") => QoS::ExactlyOnce,
        Some(other) => return Err(TransportError::Connect(format!("invalid qos: {other}"))),
    };
    let cap: usize = opts
        .params
        .get("inflight")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let mut options = MqttOptions::new(client_id, host.clone(), port);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, cap);

    // The eventloop must be driven for publishes to leave the client.
    let poller = tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                warn!(error = %e, "mqtt eventloop error");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    });
    debug!(%host, port, %topic, "mqtt hub client created");

    Ok(Box::new(MqttHub { client, topic, qos, poller }))
}

#[async_trait::async_trait]
impl HubClient for MqttHub {
    async fn send_batch(&self, events: &[Event]) -> Result<(), TransportError> {
        for ev in events {
            let frame = encode_event(ev).map_err(|e| TransportError::Send(e.to_string()))?;
            self.client
                .publish(&self.topic, self.qos, false, frame.to_vec())
                .await
                .map_err(|e| TransportError::Send(e.to_string()))?;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let res = self
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::Other(e.to_string()));
        self.poller.abort();
        res
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        if self.poller.is_finished() {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }
}
