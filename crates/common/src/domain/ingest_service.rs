use crate::codec::{decode_report, encode_envelope};
use crate::domain::{ACCEPTED_STATUS, DeliveryEnvelope, DeliveryOutcome, EnvelopeDelivery};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{Instrument, Span, debug, error, info, info_span};

/// What happened to a single inbound message
///
/// Every variant other than `Delivered` means the message was dropped; the
/// pipeline never retries and never re-queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Delivered,
    DecodeFailed,
    EncodeFailed,
    Rejected { status: u16 },
    TransportFailed,
}

impl IngestOutcome {
    pub fn is_dropped(&self) -> bool {
        !matches!(self, Self::Delivered)
    }
}

/// Domain service that turns one raw vehicle report into one delivery
///
/// Flow:
/// 1. Decode the payload into a `VehicleReport`
/// 2. Wrap it in a self-report `DeliveryEnvelope` stamped with the ingest time
/// 3. Encode the envelope
/// 4. Hand the body to the delivery client and classify the outcome
///
/// The service holds no mutable state and can be invoked concurrently.
pub struct IngestService {
    delivery: Arc<dyn EnvelopeDelivery>,
    target_url: String,
    span: Span,
}

impl IngestService {
    pub fn new(delivery: Arc<dyn EnvelopeDelivery>, target_url: impl Into<String>) -> Self {
        let target_url = target_url.into();
        let span = info_span!("ingest_service", target_url = %target_url);

        Self {
            delivery,
            target_url,
            span,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Run one message through decode, envelope, encode and delivery
    ///
    /// Never fails: every error is logged and reported through the returned
    /// outcome.
    pub async fn ingest(&self, payload: &[u8], now: DateTime<Utc>) -> IngestOutcome {
        // Each message gets its own trace, linked back to the service
        let span = info_span!(
            parent: None,
            "ingest",
            payload_size = payload.len(),
            uav_id = tracing::field::Empty,
        );
        span.follows_from(&self.span);

        self.process(payload, now).instrument(span).await
    }

    async fn process(&self, payload: &[u8], now: DateTime<Utc>) -> IngestOutcome {
        debug!(payload = %String::from_utf8_lossy(payload), "received vehicle report");

        let report = match decode_report(payload) {
            Ok(report) => report,
            Err(e) => {
                error!(
                    error = %e,
                    kind = e.kind(),
                    payload = %String::from_utf8_lossy(payload),
                    "failed to decode vehicle report, dropping message"
                );
                return IngestOutcome::DecodeFailed;
            }
        };

        Span::current().record("uav_id", report.uav_id.as_str());

        let envelope = DeliveryEnvelope::self_report(report, now);
        let body = match encode_envelope(&envelope) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "envelope encoding violated its invariant, dropping message");
                return IngestOutcome::EncodeFailed;
            }
        };

        match self.delivery.send(&self.target_url, body).await {
            DeliveryOutcome::Accepted => {
                info!(target_url = %self.target_url, "update accepted");
                IngestOutcome::Delivered
            }
            DeliveryOutcome::Rejected { status } => {
                error!(
                    target_url = %self.target_url,
                    status,
                    expected = ACCEPTED_STATUS,
                    "update rejected by receiver"
                );
                IngestOutcome::Rejected { status }
            }
            DeliveryOutcome::TransportFailure { cause } => {
                error!(
                    target_url = %self.target_url,
                    cause = %cause,
                    "update delivery failed"
                );
                IngestOutcome::TransportFailed
            }
        }
    }
}
