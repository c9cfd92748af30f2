use serde::{Deserialize, Serialize};

use crate::{track::LocationSample, units::UnitSystem};

use super::filter::segments;

/// Trailing distance, in kilometers, below which no partial split is emitted
pub const MIN_PARTIAL_SPLIT_KM: f64 = 0.1;

/// A fixed-distance slice of a completed route
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    /// 1-based, contiguous
    pub number: u32,
    /// Kilometers covered. [`split_length_km`] except for a trailing partial split.
    pub distance: f64,
    /// Wall-clock seconds from the split's first sample to its last
    pub duration_seconds: u64,
    pub pace_sec_per_km: f64,
    pub unit: UnitSystem,
    #[serde(default)]
    pub is_partial: bool,
}

/// Kilometers accumulated before a split closes: 1.0 km converted to `unit`
pub fn split_length_km(unit: UnitSystem) -> f64 {
    unit.units_per_km()
}

/// Partition a route into fixed-length splits.
///
/// Only valid segments add distance, while each split's duration is the raw
/// elapsed time since the sample the split started on. A trailing remainder
/// larger than [`MIN_PARTIAL_SPLIT_KM`] is reported as a partial split, so
/// split distances sum to the route's total distance.
pub fn calculate_splits(samples: &[LocationSample], unit: UnitSystem) -> Vec<Split> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    if samples.len() < 2 {
        return Vec::new();
    }

    let split_length = split_length_km(unit);
    let mut splits = Vec::new();
    let mut split_distance = 0.;
    let mut split_start_ms = first.timestamp_ms;

    for segment in segments(samples).filter(|segment| segment.is_valid()) {
        split_distance += segment.distance_km;

        // at most one split closes per segment; a segment longer than a split
        // carries the excess forward into the trailing partial
        if split_distance >= split_length {
            let duration_seconds = elapsed_seconds(split_start_ms, segment.curr.timestamp_ms);
            splits.push(Split {
                number: splits.len() as u32 + 1,
                distance: split_length,
                duration_seconds,
                pace_sec_per_km: duration_seconds as f64 / split_length,
                unit,
                is_partial: false,
            });
            split_distance -= split_length;
            split_start_ms = segment.curr.timestamp_ms;
        }
    }

    if split_distance > MIN_PARTIAL_SPLIT_KM {
        let last_ms = samples.last().map_or(split_start_ms, |s| s.timestamp_ms);
        let duration_seconds = elapsed_seconds(split_start_ms, last_ms);
        splits.push(Split {
            number: splits.len() as u32 + 1,
            distance: split_distance,
            duration_seconds,
            pace_sec_per_km: duration_seconds as f64 / split_distance,
            unit,
            is_partial: true,
        });
    }

    splits
}

fn elapsed_seconds(from_ms: i64, to_ms: i64) -> u64 {
    (to_ms - from_ms).max(0) as u64 / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregator::total_distance_km;
    use proptest::prelude::*;

    /// Straight line north at a steady 10 km/h, one sample every 10 s
    fn steady_run(samples: usize) -> Vec<LocationSample> {
        // 10 km/h for 10 s is 27.8 m, ~0.00025 degrees of latitude
        (0..samples)
            .map(|i| LocationSample::new(i as f64 * 0.00025, 0., i as i64 * 10_000))
            .collect()
    }

    #[test]
    fn test_single_full_split() {
        let samples = vec![
            LocationSample::new(0., 0., 0),
            LocationSample::new(0.009, 0., 360_000),
        ];
        let splits = calculate_splits(&samples, UnitSystem::Metric);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].number, 1);
        assert_eq!(splits[0].distance, 1.);
        assert_eq!(splits[0].duration_seconds, 360);
        assert_eq!(splits[0].pace_sec_per_km, 360.);
        assert!(!splits[0].is_partial);
    }

    #[test]
    fn test_partial_split_emitted() {
        // ~2.5 km
        let samples = steady_run(91);
        let splits = calculate_splits(&samples, UnitSystem::Metric);
        assert_eq!(splits.len(), 3);
        assert_eq!(
            splits.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(!splits[0].is_partial);
        assert!(!splits[1].is_partial);
        assert!(splits[2].is_partial);
        assert!(splits[2].distance > 0.4 && splits[2].distance < 0.6);
    }

    #[test]
    fn test_tiny_remainder_dropped() {
        // 1 km and a few meters
        let samples = vec![
            LocationSample::new(0., 0., 0),
            LocationSample::new(0.009, 0., 360_000),
            LocationSample::new(0.0091, 0., 370_000),
        ];
        let splits = calculate_splits(&samples, UnitSystem::Metric);
        assert_eq!(splits.len(), 1);
        assert!(!splits[0].is_partial);
    }

    #[test]
    fn test_imperial_split_length() {
        // ~2.61 km: four 0.621 km splits and a ~0.13 km remainder
        let samples = steady_run(95);
        let splits = calculate_splits(&samples, UnitSystem::Imperial);
        assert_eq!(splits.len(), 5);
        assert!(splits.iter().all(|s| s.unit == UnitSystem::Imperial));
        for split in &splits[..4] {
            assert_eq!(split.distance, split_length_km(UnitSystem::Imperial));
            assert!(!split.is_partial);
        }
        // 0.621 km at 10 km/h takes ~224 s, sampled every 10 s
        assert!(splits[0].duration_seconds >= 220 && splits[0].duration_seconds <= 230);
        assert!(splits[4].is_partial);

        let sum: f64 = splits.iter().map(|s| s.distance).sum();
        assert!((sum - total_distance_km(&samples)).abs() < 1e-9);
    }

    #[test]
    fn test_imperial_full_split_then_partial() {
        // ~1.0 km: one full imperial split and a ~0.38 km remainder
        let samples = vec![
            LocationSample::new(0., 0., 0),
            LocationSample::new(0.0045, 0., 180_000),
            LocationSample::new(0.009, 0., 360_000),
        ];
        let splits = calculate_splits(&samples, UnitSystem::Imperial);
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].distance, split_length_km(UnitSystem::Imperial));
        assert!(!splits[0].is_partial);
        assert!(splits[1].is_partial);

        let sum: f64 = splits.iter().map(|s| s.distance).sum();
        assert!((sum - total_distance_km(&samples)).abs() < 1e-9);
    }

    #[test]
    fn test_long_segment_closes_one_split() {
        // ~4 km between two fixes, 10 km/h
        let samples = vec![
            LocationSample::new(0., 0., 0),
            LocationSample::new(0.036, 0., 1_440_000),
        ];
        let splits = calculate_splits(&samples, UnitSystem::Metric);
        assert_eq!(splits.len(), 2);
        assert!(!splits[0].is_partial);
        assert_eq!(splits[0].duration_seconds, 1_440);
        assert!(splits[1].is_partial);
        assert!(splits[1].distance > 2.9 && splits[1].distance < 3.1);
        assert_eq!(splits[1].duration_seconds, 0);
    }

    #[test]
    fn test_split_duration_includes_filtered_time() {
        let samples = vec![
            LocationSample::new(0., 0., 0),
            // jitter jump, rejected
            LocationSample::new(0.02, 0.02, 1_000),
            LocationSample::new(0.0045, 0., 180_000),
            LocationSample::new(0.009, 0., 400_000),
        ];
        let splits = calculate_splits(&samples, UnitSystem::Metric);
        // only the last segment is valid, ~0.5 km, so a single partial split
        // whose clock started at the very first raw sample
        assert_eq!(splits.len(), 1);
        assert!(splits[0].is_partial);
        assert_eq!(splits[0].duration_seconds, 400);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(calculate_splits(&[], UnitSystem::Metric).is_empty());
        assert!(calculate_splits(&steady_run(1), UnitSystem::Metric).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_split_distances_sum_to_total(
            steps in prop::collection::vec((0f64..0.0004, 5_000i64..15_000), 2..300),
            unit in prop_oneof![Just(UnitSystem::Metric), Just(UnitSystem::Imperial)],
        ) {
            let mut lat = 0.;
            let mut ts = 0;
            let mut samples = vec![LocationSample::new(0., 0., 0)];
            for (d_lat, d_ts) in steps {
                lat += d_lat;
                ts += d_ts;
                samples.push(LocationSample::new(lat, 0., ts));
            }

            let total = total_distance_km(&samples);
            let splits = calculate_splits(&samples, unit);
            let sum: f64 = splits.iter().map(|s| s.distance).sum();
            // a sub-threshold remainder is dropped rather than emitted
            prop_assert!(total - sum >= -1e-9);
            prop_assert!(total - sum <= MIN_PARTIAL_SPLIT_KM + 1e-9);

            for (i, split) in splits.iter().enumerate() {
                prop_assert_eq!(split.number as usize, i + 1);
                prop_assert_eq!(split.unit, unit);
                prop_assert_eq!(
                    split.is_partial,
                    i + 1 == splits.len() && split.distance < split_length_km(unit)
                );
            }
        }
    }
}
