use crate::domain::IngestOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running tally of pipeline outcomes, safe to share between concurrent ingests
#[derive(Debug, Default)]
pub struct IngestStats {
    delivered: AtomicU64,
    decode_failed: AtomicU64,
    encode_failed: AtomicU64,
    rejected: AtomicU64,
    transport_failed: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub delivered: u64,
    pub decode_failed: u64,
    pub encode_failed: u64,
    pub rejected: u64,
    pub transport_failed: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Delivered => &self.delivered,
            IngestOutcome::DecodeFailed => &self.decode_failed,
            IngestOutcome::EncodeFailed => &self.encode_failed,
            IngestOutcome::Rejected { .. } => &self.rejected,
            IngestOutcome::TransportFailed => &self.transport_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            decode_failed: self.decode_failed.load(Ordering::Relaxed),
            encode_failed: self.encode_failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transport_failed: self.transport_failed.load(Ordering::Relaxed),
        }
    }
}

impl IngestStatsSnapshot {
    /// Messages that never reached the receiver successfully
    pub fn dropped(&self) -> u64 {
        self.decode_failed + self.encode_failed + self.rejected + self.transport_failed
    }

    pub fn total(&self) -> u64 {
        self.delivered + self.dropped()
    }
}
