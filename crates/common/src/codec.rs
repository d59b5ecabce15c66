//! JSON wire codec for inbound vehicle reports and outbound delivery envelopes.

use crate::domain::{DecodeError, DeliveryEnvelope, EncodeError, VehicleReport};
use serde_json::Value;

/// Decode a single vehicle report from an MQTT payload
///
/// The payload must be a JSON object. Unknown fields are ignored and missing
/// fields take their zero value; an empty or missing `uav_id` is accepted.
pub fn decode_report(payload: &[u8]) -> Result<VehicleReport, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;

    // Structs also deserialize from JSON arrays positionally, so the record
    // shape has to be checked before handing the value to serde.
    match value {
        Value::Object(_) => Ok(serde_json::from_value(value)?),
        Value::Array(_) => Err(DecodeError::NotARecord("array")),
        Value::String(_) => Err(DecodeError::NotARecord("string")),
        Value::Number(_) => Err(DecodeError::NotARecord("number")),
        Value::Bool(_) => Err(DecodeError::NotARecord("boolean")),
        Value::Null => Err(DecodeError::NotARecord("null")),
    }
}

/// Encode a delivery envelope into the request body sent downstream
pub fn encode_envelope(envelope: &DeliveryEnvelope) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(envelope)?)
}
