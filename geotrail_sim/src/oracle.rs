//! Ground truth oracle for simulation.
//!
//! The Oracle walks a simulated device over the globe and reports what a
//! location provider would see:
//! - True position (kinematics on a local tangent plane)
//! - Provider readings (true position plus Gaussian noise, reported accuracy)

use geotrail_env::Reading;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Meters per degree of latitude on a sphere of Earth's mean radius.
const METERS_PER_DEG: f64 = 111_195.08;

/// How the simulated device moves and how good its fixes are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionProfile {
    /// Ground speed in m/s (0 = stationary)
    pub speed_mps: f64,

    /// Standard deviation of the heading change per step (radians)
    pub heading_jitter_rad: f64,

    /// Standard deviation of the position noise per axis (meters)
    pub gps_sigma_m: f64,

    /// Reported accuracy radius of a good fix (meters)
    pub accuracy_m: f64,

    /// Probability that a fix is poor
    pub poor_fix_probability: f64,

    /// Reported accuracy radius of a poor fix (meters)
    pub poor_fix_accuracy_m: f64,
}

impl MotionProfile {
    /// Stationary device with a good fix.
    pub fn stationary() -> Self {
        Self {
            speed_mps: 0.0,
            heading_jitter_rad: 0.0,
            gps_sigma_m: 2.0,
            accuracy_m: 5.0,
            poor_fix_probability: 0.0,
            poor_fix_accuracy_m: 250.0,
        }
    }

    /// City driving.
    pub fn driving() -> Self {
        Self {
            speed_mps: 10.0,
            heading_jitter_rad: 0.1,
            gps_sigma_m: 3.0,
            accuracy_m: 8.0,
            ..Self::stationary()
        }
    }

    /// Walking through an urban canyon with frequent poor fixes.
    pub fn urban_walk() -> Self {
        Self {
            speed_mps: 1.4,
            heading_jitter_rad: 0.3,
            gps_sigma_m: 6.0,
            accuracy_m: 15.0,
            poor_fix_probability: 0.3,
            poor_fix_accuracy_m: 250.0,
        }
    }
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self::stationary()
    }
}

/// The Oracle - maintains the true track and generates provider readings.
pub struct Oracle {
    /// RNG for motion and noise (separate from anything the engine sees)
    rng: ChaCha8Rng,

    /// True latitude (degrees)
    latitude: f64,

    /// True longitude (degrees)
    longitude: f64,

    /// Direction of travel (radians, 0 = north, clockwise)
    heading_rad: f64,

    /// Current simulated wall-clock time (Unix ms)
    time_ms: i64,
}

impl Oracle {
    /// Creates an oracle at `origin` (lat, lng) with the clock at `start_ms`.
    pub fn new(seed: u64, origin: (f64, f64), start_ms: i64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let heading_rad = rng.gen_range(0.0..std::f64::consts::TAU);

        Self {
            rng,
            latitude: origin.0,
            longitude: origin.1,
            heading_rad,
            time_ms: start_ms,
        }
    }

    /// True position (lat, lng).
    pub fn truth(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Advances the true track by `dt` and returns the reading taken there.
    pub fn step(&mut self, dt: Duration, profile: &MotionProfile) -> Reading {
        self.time_ms += dt.as_millis() as i64;

        if profile.speed_mps > 0.0 {
            self.heading_rad += gaussian(&mut self.rng, profile.heading_jitter_rad);
            let distance = profile.speed_mps * dt.as_secs_f64();
            let (north, east) = (
                distance * self.heading_rad.cos(),
                distance * self.heading_rad.sin(),
            );
            (self.latitude, self.longitude) = offset(self.latitude, self.longitude, north, east);
        }

        self.observe(profile)
    }

    /// Generates `count` readings spaced `dt` apart.
    pub fn track(&mut self, count: usize, dt: Duration, profile: &MotionProfile) -> Vec<Reading> {
        (0..count).map(|_| self.step(dt, profile)).collect()
    }

    /// Reading at the current true position without moving.
    pub fn observe(&mut self, profile: &MotionProfile) -> Reading {
        let north = gaussian(&mut self.rng, profile.gps_sigma_m);
        let east = gaussian(&mut self.rng, profile.gps_sigma_m);
        let (lat, lng) = offset(self.latitude, self.longitude, north, east);

        let poor = self.rng.gen_bool(profile.poor_fix_probability.clamp(0.0, 1.0));
        let accuracy = if poor {
            profile.poor_fix_accuracy_m
        } else {
            profile.accuracy_m
        };

        let mut reading = Reading::new(lat, lng, self.time_ms).with_accuracy(accuracy);
        if profile.speed_mps > 0.0 {
            reading = reading.with_speed(profile.speed_mps);
        }
        reading
    }
}

/// Zero-mean sample; a degenerate sigma yields no noise.
fn gaussian(rng: &mut ChaCha8Rng, sigma: f64) -> f64 {
    if !(sigma.is_finite() && sigma > 0.0) {
        return 0.0;
    }
    Normal::new(0.0, sigma).map(|n| n.sample(rng)).unwrap_or(0.0)
}

/// Moves (lat, lng) by a small north/east displacement in meters.
fn offset(lat: f64, lng: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let new_lat = (lat + north_m / METERS_PER_DEG).clamp(-89.9, 89.9);
    let cos_lat = new_lat.to_radians().cos().max(1e-6);
    let mut new_lng = lng + east_m / (METERS_PER_DEG * cos_lat);
    if new_lng > 180.0 {
        new_lng -= 360.0;
    } else if new_lng < -180.0 {
        new_lng += 360.0;
    }
    (new_lat, new_lng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Point;
    use geotrail_core::filter::haversine_m;
    use geotrail_core::sample::validate_coordinates;
    use proptest::prelude::*;

    const KIEL: (f64, f64) = (54.3233, 10.1228);

    #[test]
    fn test_same_seed_same_track() {
        let mut a = Oracle::new(42, KIEL, 0);
        let mut b = Oracle::new(42, KIEL, 0);
        let profile = MotionProfile::driving();

        let ta = a.track(20, Duration::from_secs(5), &profile);
        let tb = b.track(20, Duration::from_secs(5), &profile);
        assert_eq!(ta, tb);
    }

    #[test]
    fn test_timestamps_spaced_by_dt() {
        let mut oracle = Oracle::new(1, KIEL, 1_000);
        let track = oracle.track(3, Duration::from_secs(5), &MotionProfile::stationary());
        let times: Vec<i64> = track.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(times, vec![6_000, 11_000, 16_000]);
    }

    #[test]
    fn test_driving_covers_expected_distance() {
        let profile = MotionProfile {
            heading_jitter_rad: 0.0,
            ..MotionProfile::driving()
        };
        let mut oracle = Oracle::new(3, KIEL, 0);
        let before = oracle.truth();
        oracle.step(Duration::from_secs(10), &profile);
        let after = oracle.truth();

        let d = haversine_m(Point::new(before.1, before.0), Point::new(after.1, after.0));
        assert_relative_eq!(d, 100.0, max_relative = 0.01);
    }

    #[test]
    fn test_readings_stay_in_range() {
        let mut oracle = Oracle::new(9, (89.95, 179.99), 0);
        let profile = MotionProfile {
            speed_mps: 500.0,
            ..MotionProfile::urban_walk()
        };
        for reading in oracle.track(200, Duration::from_secs(5), &profile) {
            assert!((-90.0..=90.0).contains(&reading.latitude));
            assert!((-180.0..=180.0).contains(&reading.longitude));
        }
    }

    proptest! {
        #[test]
        fn prop_every_reading_is_a_valid_coordinate(
            seed in any::<u64>(),
            lat in -89.0f64..89.0,
            lng in -179.0f64..179.0,
        ) {
            let mut oracle = Oracle::new(seed, (lat, lng), 0);
            for reading in oracle.track(50, Duration::from_secs(30), &MotionProfile::driving()) {
                let checked =
                    validate_coordinates(reading.latitude, reading.longitude, reading.accuracy_m);
                prop_assert!(checked.is_ok());
            }
        }
    }
}
