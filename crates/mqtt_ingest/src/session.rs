//! Broker session state machine.
//!
//! The session owns the connection lifecycle and exposes it through a
//! polling interface: every call to [`BrokerSession::poll`] drives the
//! transport until there is something for the caller, either a state change
//! or an inbound message.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Subscribed
//!                     ^             |            |
//!                     +-------------+------------+   (transport error)
//! ```
//!
//! Reconnects use a fixed interval and never give up once the first
//! connection has been made. Brokers do not keep our subscription across a
//! clean session, so the subscribe request is re-issued on every ConnAck.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Subscribed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message received on the subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Message(InboundMessage),
}

/// Broker-level happenings the session reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ConnAck { accepted: bool },
    SubAck { granted: bool },
    Publish { topic: String, payload: Bytes },
    /// Pings, outgoing packets and anything else the session ignores
    Other,
}

/// Seam between the session and the MQTT client library
#[async_trait]
pub trait BrokerTransport: Send {
    /// Wait for the next broker event. An error means the connection is gone;
    /// calling again starts a new connection attempt.
    async fn next_event(&mut self) -> SessionResult<TransportEvent>;

    /// Queue a QoS 0 subscribe request for `topic`
    fn request_subscribe(&mut self, topic: &str) -> SessionResult<()>;

    /// Send a disconnect and give it up to `grace` to reach the broker
    async fn disconnect(&mut self, grace: Duration) -> SessionResult<()>;
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub topic: String,
    pub reconnect_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: "updates".to_string(),
            reconnect_interval: Duration::from_secs(3),
        }
    }
}

pub struct BrokerSession<T: BrokerTransport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    pending: VecDeque<SessionEvent>,
    backoff: bool,
}

impl<T: BrokerTransport> BrokerSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Disconnected,
            pending: VecDeque::new(),
            backoff: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Establish the first connection
    ///
    /// Transport errors are retried at the reconnect interval until
    /// `startup_timeout` runs out, at which point the session gives up with
    /// [`SessionError::InitialConnect`]. State changes made here are still
    /// reported by the following `poll` calls.
    pub async fn connect(&mut self, startup_timeout: Duration) -> SessionResult<()> {
        let deadline = Instant::now() + startup_timeout;
        let mut attempts: u32 = 0;
        let mut last_error = String::from("no response from broker");

        info!(
            topic = %self.config.topic,
            startup_timeout_ms = startup_timeout.as_millis() as u64,
            "connecting to broker"
        );
        self.transition(SessionState::Connecting);

        loop {
            match tokio::time::timeout_at(deadline, self.drive()).await {
                Err(_elapsed) => break,
                Ok(Ok(message)) => {
                    if let Some(message) = message {
                        self.pending.push_back(SessionEvent::Message(message));
                    }
                    if self.state.is_connected() {
                        return Ok(());
                    }
                }
                Ok(Err(e)) => {
                    attempts += 1;
                    last_error = e.to_string();
                    warn!(
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = self.config.reconnect_interval.as_millis() as u64,
                        "broker connection attempt failed"
                    );
                    self.transition(SessionState::Connecting);

                    if Instant::now() + self.config.reconnect_interval >= deadline {
                        break;
                    }
                    tokio::time::sleep(self.config.reconnect_interval).await;
                }
            }
        }

        Err(SessionError::InitialConnect {
            attempts,
            last_error,
        })
    }

    /// Wait for the next session event
    ///
    /// Connection loss is handled here: the session moves back to
    /// `Connecting`, reports that change, then waits the reconnect interval
    /// before the next attempt. Returns `None` once the session has been shut
    /// down (or was never connected).
    pub async fn poll(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.state == SessionState::Disconnected {
                return None;
            }
            if self.backoff {
                self.backoff = false;
                tokio::time::sleep(self.config.reconnect_interval).await;
            }

            match self.drive().await {
                Ok(Some(message)) => return Some(SessionEvent::Message(message)),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = self.config.reconnect_interval.as_millis() as u64,
                        "lost connection to broker, reconnecting"
                    );
                    self.transition(SessionState::Connecting);
                    self.backoff = true;
                }
            }
        }
    }

    /// Disconnect from the broker, waiting at most `grace` for the
    /// disconnect to flush. The session ends `Disconnected` either way.
    pub async fn shutdown(&mut self, grace: Duration) -> SessionResult<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }

        info!(grace_ms = grace.as_millis() as u64, "disconnecting from broker");
        let result = self.transport.disconnect(grace).await;
        self.transition(SessionState::Disconnected);
        result
    }

    /// Pull one event from the transport and apply it to the state machine
    async fn drive(&mut self) -> SessionResult<Option<InboundMessage>> {
        match self.transport.next_event().await? {
            TransportEvent::ConnAck { accepted: true } => {
                self.transition(SessionState::Connected);
                match self.transport.request_subscribe(&self.config.topic) {
                    Ok(()) => debug!(topic = %self.config.topic, "subscribe requested"),
                    Err(e) => error!(
                        topic = %self.config.topic,
                        error = %e,
                        "failed to request subscription"
                    ),
                }
                Ok(None)
            }
            TransportEvent::ConnAck { accepted: false } => Err(SessionError::ConnectionRefused),
            TransportEvent::SubAck { granted: true } => {
                if self.state == SessionState::Connected {
                    self.transition(SessionState::Subscribed);
                }
                Ok(None)
            }
            TransportEvent::SubAck { granted: false } => {
                warn!(topic = %self.config.topic, "broker refused subscription");
                Ok(None)
            }
            TransportEvent::Publish { topic, payload } => {
                Ok(Some(InboundMessage { topic, payload }))
            }
            TransportEvent::Other => Ok(None),
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }

        info!(from = %from, to = %to, topic = %self.config.topic, "broker session state changed");
        self.state = to;
        self.pending.push_back(SessionEvent::StateChanged { from, to });
    }
}
