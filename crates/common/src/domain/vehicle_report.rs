use serde::{Deserialize, Serialize};

/// A single point-in-time position report published by a vehicle
///
/// All fields are passed through opaquely: no range checks are applied and a
/// missing field decodes to its zero value. Unknown fields on the wire are
/// ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleReport {
    pub uav_id: String,
    pub uav_type: String,
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    /// Heading in degrees
    pub direction: f64,
    pub vertical_speed: f64,
}
