//! Extent Aggregator - fits a view to a set of samples.
//!
//! Pure functions, independent of engine state:
//! - [`compute_extent`]: center + span of the bounding box, with a minimum span
//! - [`aggregate_cells`]: per-H3-cell sample counts for renderers that thin points

use crate::sample::Sample;
use geo::{BoundingRect, MultiPoint};
use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum span per axis, in degrees. Keeps a single point from producing a
/// zero-size view region.
pub const DEFAULT_SPAN_FLOOR_DEG: f64 = 0.01;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Size of a view region in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub lat_delta: f64,
    pub lng_delta: f64,
}

/// Center point and bounding span used to fit a view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub center: Coordinate,
    pub span: Span,
}

impl Extent {
    /// South-west corner of the (floored) view region.
    pub fn south_west(&self) -> Coordinate {
        Coordinate {
            lat: self.center.lat - self.span.lat_delta / 2.0,
            lng: self.center.lng - self.span.lng_delta / 2.0,
        }
    }

    /// North-east corner of the (floored) view region.
    pub fn north_east(&self) -> Coordinate {
        Coordinate {
            lat: self.center.lat + self.span.lat_delta / 2.0,
            lng: self.center.lng + self.span.lng_delta / 2.0,
        }
    }
}

/// Computes the extent with the default span floor.
pub fn compute_extent(samples: &[Sample]) -> Option<Extent> {
    compute_extent_with_floor(samples, DEFAULT_SPAN_FLOOR_DEG)
}

/// Computes the extent; `None` for an empty input.
///
/// Center is the midpoint of min/max per axis. Span is the axis range,
/// raised to at least `floor_deg`.
pub fn compute_extent_with_floor(samples: &[Sample], floor_deg: f64) -> Option<Extent> {
    let points: MultiPoint<f64> = samples.iter().map(Sample::point).collect();
    let rect = points.bounding_rect()?;

    let floor = if floor_deg.is_finite() { floor_deg.max(0.0) } else { 0.0 };
    let center = rect.center();

    Some(Extent {
        center: Coordinate {
            lat: center.y,
            lng: center.x,
        },
        span: Span {
            lat_delta: rect.height().max(floor),
            lng_delta: rect.width().max(floor),
        },
    })
}

/// Number of samples inside one H3 cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellBucket {
    pub cell: CellIndex,
    /// Cell centroid
    pub center: Coordinate,
    pub count: usize,
}

/// Groups samples by H3 cell at `resolution`.
///
/// Sorted by descending count, then by cell index for a stable order.
pub fn aggregate_cells(samples: &[Sample], resolution: Resolution) -> Vec<CellBucket> {
    let mut counts: HashMap<CellIndex, usize> = HashMap::new();

    for sample in samples {
        // Samples are range-checked on creation; skip anything that slipped through
        let Ok(latlng) = LatLng::new(sample.latitude, sample.longitude) else {
            continue;
        };
        *counts.entry(latlng.to_cell(resolution)).or_insert(0) += 1;
    }

    let mut buckets: Vec<CellBucket> = counts
        .into_iter()
        .map(|(cell, count)| {
            let centroid = LatLng::from(cell);
            CellBucket {
                cell,
                center: Coordinate {
                    lat: centroid.lat(),
                    lng: centroid.lng(),
                },
                count,
            }
        })
        .collect();

    buckets.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| u64::from(a.cell).cmp(&u64::from(b.cell)))
    });
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{NewSample, SampleId};
    use approx::assert_relative_eq;
    use geotrail_env::Reading;
    use proptest::prelude::*;

    fn sample(id: u64, lat: f64, lng: f64) -> Sample {
        NewSample::from_reading(&Reading::new(lat, lng, id as i64 * 1000))
            .unwrap()
            .into_sample(SampleId(id))
    }

    #[test]
    fn test_empty_input_has_no_extent() {
        assert_eq!(compute_extent(&[]), None);
    }

    #[test]
    fn test_single_point_gets_floor_span() {
        let extent = compute_extent(&[sample(1, 10.0, 20.0)]).unwrap();

        assert_eq!(extent.center, Coordinate { lat: 10.0, lng: 20.0 });
        assert!(extent.span.lat_delta >= DEFAULT_SPAN_FLOOR_DEG);
        assert!(extent.span.lng_delta >= DEFAULT_SPAN_FLOOR_DEG);
    }

    #[test]
    fn test_two_points_center_and_span() {
        let extent = compute_extent(&[sample(1, 0.0, 0.0), sample(2, 10.0, 10.0)]).unwrap();

        assert_eq!(extent.center, Coordinate { lat: 5.0, lng: 5.0 });
        assert_eq!(
            extent.span,
            Span {
                lat_delta: 10.0,
                lng_delta: 10.0
            }
        );
    }

    #[test]
    fn test_floor_applies_per_axis() {
        // Wide in longitude, flat in latitude
        let extent = compute_extent(&[sample(1, 54.0, 10.0), sample(2, 54.0, 10.5)]).unwrap();

        assert_relative_eq!(extent.span.lng_delta, 0.5);
        assert_relative_eq!(extent.span.lat_delta, DEFAULT_SPAN_FLOOR_DEG);
        assert_relative_eq!(extent.center.lng, 10.25);
    }

    #[test]
    fn test_custom_floor_and_corners() {
        let extent = compute_extent_with_floor(&[sample(1, 1.0, 1.0)], 2.0).unwrap();

        assert_eq!(extent.south_west(), Coordinate { lat: 0.0, lng: 0.0 });
        assert_eq!(extent.north_east(), Coordinate { lat: 2.0, lng: 2.0 });
    }

    #[test]
    fn test_cells_group_nearby_samples() {
        let samples = vec![
            sample(1, 54.3233, 10.1228),
            sample(2, 54.3233, 10.1228),
            sample(3, 54.3234, 10.1229),
            sample(4, 48.1372, 11.5756),
        ];

        let buckets = aggregate_cells(&samples, Resolution::Nine);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].count, 3);
        assert_eq!(buckets[1].count, 1);
        assert_relative_eq!(buckets[0].center.lat, 54.3233, epsilon = 0.01);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), samples.len());
    }

    #[test]
    fn test_cells_of_empty_input() {
        assert!(aggregate_cells(&[], Resolution::Five).is_empty());
    }

    proptest! {
        #[test]
        fn prop_extent_covers_every_sample(
            coords in prop::collection::vec((-90.0f64..=90.0, -180.0f64..=180.0), 1..40)
        ) {
            let samples: Vec<Sample> = coords
                .iter()
                .enumerate()
                .map(|(i, (lat, lng))| sample(i as u64, *lat, *lng))
                .collect();
            let extent = compute_extent(&samples).unwrap();
            let sw = extent.south_west();
            let ne = extent.north_east();

            for s in &samples {
                prop_assert!(s.latitude >= sw.lat - 1e-9 && s.latitude <= ne.lat + 1e-9);
                prop_assert!(s.longitude >= sw.lng - 1e-9 && s.longitude <= ne.lng + 1e-9);
            }
            prop_assert!(extent.span.lat_delta >= DEFAULT_SPAN_FLOOR_DEG);
            prop_assert!(extent.span.lng_delta >= DEFAULT_SPAN_FLOOR_DEG);
        }
    }
}
