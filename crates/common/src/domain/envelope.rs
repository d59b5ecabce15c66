use crate::domain::VehicleReport;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ORIGIN_KEY: &str = "origin";
pub const INGEST_TIMESTAMP_KEY: &str = "ingest_timestamp";

/// Origin tag for reports that vehicles published about themselves
pub const SELF_REPORT_ORIGIN: &str = "self_report";

/// Status the receiver answers with once an async invocation is queued
pub const ACCEPTED_STATUS: u16 = 202;

/// Outbound unit handed to the downstream receiver
///
/// Serialized as `{"data": [...], "meta": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    pub data: Vec<VehicleReport>,
    pub meta: BTreeMap<String, String>,
}

impl DeliveryEnvelope {
    /// Wrap a single self-reported observation, stamped with the time it was ingested
    pub fn self_report(report: VehicleReport, ingested_at: DateTime<Utc>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(ORIGIN_KEY.to_string(), SELF_REPORT_ORIGIN.to_string());
        meta.insert(
            INGEST_TIMESTAMP_KEY.to_string(),
            ingested_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        Self {
            data: vec![report],
            meta,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.meta.get(ORIGIN_KEY).map(String::as_str)
    }

    pub fn ingest_timestamp(&self) -> Option<&str> {
        self.meta.get(INGEST_TIMESTAMP_KEY).map(String::as_str)
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Receiver queued the envelope for asynchronous processing
    Accepted,
    /// Receiver answered with anything other than 202
    Rejected { status: u16 },
    /// No usable answer: connect failure, timeout or broken request
    TransportFailure { cause: String },
}

impl DeliveryOutcome {
    /// Classify a receiver status code. Only 202 counts as accepted.
    pub fn from_status(status: u16) -> Self {
        if status == ACCEPTED_STATUS {
            Self::Accepted
        } else {
            Self::Rejected { status }
        }
    }
}

/// Trait for handing encoded envelopes to the downstream receiver
///
/// Implementations should:
/// - Perform exactly one outbound call per invocation
/// - Never retry; retry policy belongs to the caller
/// - Map every failure into a `DeliveryOutcome` instead of returning an error
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EnvelopeDelivery: Send + Sync {
    /// Deliver an encoded envelope body to `target_url`
    async fn send(&self, target_url: &str, body: Vec<u8>) -> DeliveryOutcome;
}
