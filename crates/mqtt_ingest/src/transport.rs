use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};
use crate::session::{BrokerTransport, TransportEvent};

const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Where and how to reach the MQTT broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Client identifier unique per process start
pub fn client_id() -> String {
    format!("ingester-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

/// [`BrokerTransport`] backed by a rumqttc client and event loop
///
/// The event loop reconnects by itself on the next poll after an error, so
/// the session only has to pace the retries.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    pub fn new(config: &BrokerConfig) -> Self {
        let client_id = client_id();
        let mut options = MqttOptions::new(client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        debug!(
            client_id = %client_id,
            host = %config.host,
            port = config.port,
            keep_alive_secs = config.keep_alive.as_secs(),
            "created MQTT client"
        );

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        Self { client, eventloop }
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    async fn next_event(&mut self) -> SessionResult<TransportEvent> {
        let event = self
            .eventloop
            .poll()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(map_event(event))
    }

    fn request_subscribe(&mut self, topic: &str) -> SessionResult<()> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| SessionError::Subscribe(e.to_string()))
    }

    async fn disconnect(&mut self, grace: Duration) -> SessionResult<()> {
        self.client
            .try_disconnect()
            .map_err(|e| SessionError::Disconnect(e.to_string()))?;

        // The request only leaves the process while the event loop is polled
        let eventloop = &mut self.eventloop;
        let flushed = tokio::time::timeout(grace, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "disconnect not flushed within grace period"
            );
        }
        Ok(())
    }
}

fn map_event(event: Event) -> TransportEvent {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => TransportEvent::ConnAck {
            accepted: matches!(ack.code, ConnectReturnCode::Success),
        },
        Event::Incoming(Packet::SubAck(ack)) => TransportEvent::SubAck {
            granted: !ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure)),
        },
        Event::Incoming(Packet::Publish(publish)) => TransportEvent::Publish {
            topic: publish.topic,
            payload: publish.payload,
        },
        _ => TransportEvent::Other,
    }
}
