//! Common types for the GeoTrail environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one tracking session.
///
/// Uses UUID v4 so sessions are distinguishable in logs without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SessionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Accuracy hint passed through to the position provider.
///
/// Trades battery and latency for precision. It does not affect filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredAccuracy {
    High,
    #[default]
    Balanced,
    LowPower,
}

/// Outcome of a consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Granted,
    Denied,
}

impl Permission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Permission::Granted)
    }
}

/// A raw, not-yet-filtered observation from the position provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Estimated horizontal error radius in meters
    pub accuracy_m: Option<f64>,

    /// Altitude in meters
    pub altitude_m: Option<f64>,

    /// Ground speed in m/s
    pub speed_mps: Option<f64>,

    /// Provider timestamp (Unix milliseconds, UTC)
    pub timestamp_ms: i64,
}

impl Reading {
    /// Creates a reading with only a position and timestamp.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            altitude_m: None,
            speed_mps: None,
            timestamp_ms,
        }
    }

    /// Sets the accuracy radius.
    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Sets the altitude.
    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }

    /// Sets the ground speed.
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_seed_is_deterministic() {
        assert_eq!(SessionId::from_seed(7), SessionId::from_seed(7));
        assert_ne!(SessionId::from_seed(7), SessionId::from_seed(8));
    }

    #[test]
    fn test_session_id_display_is_short() {
        let id = SessionId::new();
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn test_reading_builder() {
        let reading = Reading::new(54.3, 10.1, 1_000)
            .with_accuracy(12.0)
            .with_altitude(30.0)
            .with_speed(1.4);

        assert_eq!(reading.accuracy_m, Some(12.0));
        assert_eq!(reading.altitude_m, Some(30.0));
        assert_eq!(reading.speed_mps, Some(1.4));
        assert_eq!(reading.timestamp_ms, 1_000);
    }
}
