//! MQTT side of the ingester: broker session lifecycle and the control loop
//! that feeds every inbound report through the ingest pipeline.

mod error;
mod ingest_loop;
mod session;
mod transport;

#[cfg(test)]
mod test_support;

pub use error::*;
pub use ingest_loop::*;
pub use session::*;
pub use transport::*;
