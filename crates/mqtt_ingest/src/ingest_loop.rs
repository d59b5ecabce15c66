use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::domain::{IngestService, IngestStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{BrokerSession, BrokerTransport, SessionEvent};

/// Control loop tying a connected broker session to the ingest pipeline
///
/// Messages are processed one at a time in arrival order. Cancellation is
/// only observed between messages, so a delivery in flight finishes (or
/// times out) before the session is shut down.
pub struct MqttIngester<T: BrokerTransport> {
    session: BrokerSession<T>,
    service: Arc<IngestService>,
    stats: Arc<IngestStats>,
    disconnect_grace: Duration,
}

impl<T: BrokerTransport> MqttIngester<T> {
    pub fn new(
        session: BrokerSession<T>,
        service: Arc<IngestService>,
        stats: Arc<IngestStats>,
        disconnect_grace: Duration,
    ) -> Self {
        Self {
            session,
            service,
            stats,
            disconnect_grace,
        }
    }

    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            topic = %self.session.topic(),
            target_url = %self.service.target_url(),
            "starting ingest loop"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("ingest loop received shutdown signal");
                    break;
                }
                event = self.session.poll() => match event {
                    Some(SessionEvent::Message(message)) => {
                        debug!(topic = %message.topic, size_bytes = message.payload.len(), "message received");
                        let outcome = self.service.ingest(&message.payload, Utc::now()).await;
                        self.stats.record(&outcome);
                    }
                    Some(SessionEvent::StateChanged { from, to }) => {
                        debug!(from = %from, to = %to, "ingest loop observed session state change");
                    }
                    None => {
                        warn!("broker session closed, stopping ingest loop");
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.session.shutdown(self.disconnect_grace).await {
            warn!(error = %e, "broker disconnect did not complete cleanly");
        }

        let snapshot = self.stats.snapshot();
        info!(
            delivered = snapshot.delivered,
            dropped = snapshot.dropped(),
            decode_failed = snapshot.decode_failed,
            encode_failed = snapshot.encode_failed,
            rejected = snapshot.rejected,
            transport_failed = snapshot.transport_failed,
            "ingest loop stopped"
        );

        Ok(())
    }
}
