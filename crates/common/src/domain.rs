mod envelope;
mod error;
mod ingest_service;
mod ingest_stats;
mod vehicle_report;

pub use envelope::*;
pub use error::*;
pub use ingest_service::*;
pub use ingest_stats::*;
pub use vehicle_report::*;
