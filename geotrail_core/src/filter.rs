//! The Sample Filter - decides which raw readings become samples.
//!
//! Pure and stateless: the caller supplies the last accepted sample.
//!
//! # Gating policy
//!
//! A reading is kept when it moved far enough **or** enough time passed since
//! the last accepted sample. A stationary device still gets periodic fixes and
//! a fast-moving one gets denser fixes inside the interval floor. Requiring
//! both thresholds (AND) would thin tracks considerably; OR is the chosen
//! product behaviour.

use crate::config::TrackingConfig;
use crate::sample::{validate_coordinates, Sample};
use geo::{HaversineDistance, Point};
use geotrail_env::Reading;
use serde::{Deserialize, Serialize};

/// Why a reading was dropped. Rejections are not errors and raise no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Latitude/longitude out of range or negative accuracy
    InvalidCoordinates,
    /// Accuracy radius above `max_accuracy_m`
    InsufficientAccuracy,
    /// Timestamp earlier than the last accepted sample
    OutOfOrder,
    /// Neither the distance nor the interval threshold was reached
    BelowThreshold,
}

/// Filter outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(RejectReason),
}

/// Great-circle distance in meters on a sphere of Earth's mean radius.
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    a.haversine_distance(&b)
}

/// Decides whether `candidate` should be kept.
pub fn decide(
    candidate: &Reading,
    last_accepted: Option<&Sample>,
    config: &TrackingConfig,
) -> Decision {
    let coordinates =
        validate_coordinates(candidate.latitude, candidate.longitude, candidate.accuracy_m);
    if coordinates.is_err() {
        return Decision::Reject(RejectReason::InvalidCoordinates);
    }

    if let (Some(max), Some(acc)) = (config.max_accuracy_m, candidate.accuracy_m) {
        if acc > max {
            return Decision::Reject(RejectReason::InsufficientAccuracy);
        }
    }

    let Some(last) = last_accepted else {
        return Decision::Accept;
    };

    if candidate.timestamp_ms < last.timestamp_ms {
        return Decision::Reject(RejectReason::OutOfOrder);
    }

    let distance_gated = config.min_distance_m > 0.0;
    let time_gated = config.min_interval_secs > 0.0;
    if !distance_gated && !time_gated {
        return Decision::Accept;
    }

    let distance = haversine_m(
        Point::new(candidate.longitude, candidate.latitude),
        last.point(),
    );
    let elapsed_secs = (candidate.timestamp_ms - last.timestamp_ms) as f64 / 1000.0;

    let moved = distance_gated && distance >= config.min_distance_m;
    let waited = time_gated && elapsed_secs >= config.min_interval_secs;

    if moved || waited {
        Decision::Accept
    } else {
        Decision::Reject(RejectReason::BelowThreshold)
    }
}
