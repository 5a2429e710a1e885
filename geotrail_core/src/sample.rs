//! Sample model - accepted location observations.
//!
//! A `NewSample` is what the engine builds from a reading that passed the
//! filter. The store assigns a `SampleId` on append and hands back the
//! immutable `Sample`.

use geo::Point;
use geotrail_env::Reading;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned, monotonically increasing sample identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(pub u64);

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coordinate invariant violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),

    #[error("accuracy radius {0} is negative or not finite")]
    Accuracy(f64),
}

/// Checks the latitude/longitude ranges and the accuracy sign.
///
/// NaN fails the range checks, so non-finite coordinates are rejected too.
pub fn validate_coordinates(
    latitude: f64,
    longitude: f64,
    accuracy_m: Option<f64>,
) -> Result<(), CoordinateError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(CoordinateError::Latitude(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(CoordinateError::Longitude(longitude));
    }
    if let Some(acc) = accuracy_m {
        if !acc.is_finite() || acc < 0.0 {
            return Err(CoordinateError::Accuracy(acc));
        }
    }
    Ok(())
}

/// A sample that has been accepted but not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_mps: Option<f64>,
    /// Unix milliseconds (UTC)
    pub timestamp_ms: i64,
    pub note: Option<String>,
}

impl NewSample {
    /// Builds a sample from a raw reading, enforcing the coordinate invariant.
    pub fn from_reading(reading: &Reading) -> Result<Self, CoordinateError> {
        validate_coordinates(reading.latitude, reading.longitude, reading.accuracy_m)?;

        Ok(Self {
            latitude: reading.latitude,
            longitude: reading.longitude,
            accuracy_m: reading.accuracy_m,
            altitude_m: reading.altitude_m,
            speed_mps: reading.speed_mps,
            timestamp_ms: reading.timestamp_ms,
            note: None,
        })
    }

    /// Attaches free text to the sample.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Finalizes the sample with the id assigned by the store.
    pub fn into_sample(self, id: SampleId) -> Sample {
        Sample {
            id,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_m: self.accuracy_m,
            altitude_m: self.altitude_m,
            speed_mps: self.speed_mps,
            timestamp_ms: self.timestamp_ms,
            note: self.note,
        }
    }
}

/// An accepted, persisted location observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,

    /// Latitude in degrees, within [-90, 90]
    pub latitude: f64,

    /// Longitude in degrees, within [-180, 180]
    pub longitude: f64,

    /// Estimated horizontal error radius in meters
    pub accuracy_m: Option<f64>,

    pub altitude_m: Option<f64>,

    pub speed_mps: Option<f64>,

    /// Unix milliseconds (UTC)
    pub timestamp_ms: i64,

    /// Opaque to the engine
    pub note: Option<String>,
}

impl Sample {
    /// Position as a geo point (x = longitude, y = latitude).
    #[inline]
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coordinates_bounds_inclusive() {
        assert!(validate_coordinates(90.0, 180.0, None).is_ok());
        assert!(validate_coordinates(-90.0, -180.0, Some(0.0)).is_ok());
    }

    #[test]
    fn test_validate_coordinates_rejects_out_of_range() {
        assert_eq!(
            validate_coordinates(90.5, 0.0, None),
            Err(CoordinateError::Latitude(90.5))
        );
        assert_eq!(
            validate_coordinates(0.0, -181.0, None),
            Err(CoordinateError::Longitude(-181.0))
        );
        assert!(validate_coordinates(f64::NAN, 0.0, None).is_err());
        assert!(validate_coordinates(0.0, 0.0, Some(-1.0)).is_err());
    }

    #[test]
    fn test_new_sample_from_reading_copies_fields() {
        let reading = Reading::new(54.32, 10.13, 1_700_000_000_000)
            .with_accuracy(8.0)
            .with_speed(3.0);

        let sample = NewSample::from_reading(&reading)
            .unwrap()
            .with_note("harbour")
            .into_sample(SampleId(4));

        assert_eq!(sample.id, SampleId(4));
        assert_eq!(sample.latitude, 54.32);
        assert_eq!(sample.accuracy_m, Some(8.0));
        assert_eq!(sample.speed_mps, Some(3.0));
        assert_eq!(sample.altitude_m, None);
        assert_eq!(sample.note.as_deref(), Some("harbour"));
        assert_eq!(sample.point().x(), 10.13);
        assert_eq!(sample.point().y(), 54.32);
    }
}
