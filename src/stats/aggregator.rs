use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::track::LocationSample;

use super::filter::segments;

/// Altitude changes within this band are treated as sensor noise
pub const ELEVATION_NOISE_M: f64 = 3.;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Elevation {
    pub ascent_m: f64,
    pub descent_m: f64,
}

/// Whole-route aggregates. Distances and speeds are always metric.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    /// Sum of the distances of all valid segments
    pub total_distance_km: f64,
    /// Wall-clock time between the first and last raw samples, truncated
    pub duration_seconds: u64,
    /// Seconds per kilometer. Zero means undefined (no distance covered).
    pub avg_pace_sec_per_km: f64,
    /// Fastest valid segment, zero when there is none
    pub max_speed_kmh: f64,
    /// Absent when no sample reported an altitude
    pub elevation: Option<Elevation>,
}

pub fn total_distance_km(samples: &[LocationSample]) -> f64 {
    segments(samples)
        .filter(|segment| segment.is_valid())
        .map(|segment| segment.distance_km)
        .sum()
}

/// Elapsed wall-clock seconds between the first and last raw samples
pub fn duration_seconds(samples: &[LocationSample]) -> u64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() >= 2 => {
            (last.timestamp_ms - first.timestamp_ms).max(0) as u64 / 1000
        }
        _ => 0,
    }
}

pub fn avg_pace_sec_per_km(distance_km: f64, duration_seconds: u64) -> f64 {
    if distance_km <= 0. {
        return 0.;
    }
    duration_seconds as f64 / distance_km
}

pub fn max_speed_kmh(samples: &[LocationSample]) -> f64 {
    segments(samples)
        .filter(|segment| segment.is_valid())
        .filter_map(|segment| segment.speed_kmh())
        .fold(0., f64::max)
}

/// Cumulative ascent and descent, or `None` when no sample carries altitude.
///
/// Each consecutive pair with an altitude on both samples contributes its
/// delta once it leaves the noise band. Pairs with a missing altitude are
/// skipped, never bridged.
pub fn elevation(samples: &[LocationSample]) -> Option<Elevation> {
    if samples.len() < 2 || samples.iter().all(|sample| sample.altitude_m.is_none()) {
        return None;
    }

    let mut ascent = 0.;
    let mut descent = 0.;
    for (prev, curr) in samples.iter().tuple_windows() {
        let (Some(prev_alt), Some(curr_alt)) = (prev.altitude_m, curr.altitude_m) else {
            continue;
        };
        let delta = curr_alt - prev_alt;
        if delta > ELEVATION_NOISE_M {
            ascent += delta;
        } else if delta < -ELEVATION_NOISE_M {
            descent += delta.abs();
        }
    }

    Some(Elevation {
        ascent_m: round_to_tenth(ascent),
        descent_m: round_to_tenth(descent),
    })
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.).round() / 10.
}

/// Reduce a raw sample sequence into route aggregates. Never fails: fewer
/// than two samples yields zeroed aggregates and no elevation.
pub fn aggregate(samples: &[LocationSample]) -> RouteStats {
    if samples.len() < 2 {
        return RouteStats::default();
    }

    let total_distance_km = total_distance_km(samples);
    let duration_seconds = duration_seconds(samples);

    RouteStats {
        total_distance_km,
        duration_seconds,
        avg_pace_sec_per_km: avg_pace_sec_per_km(total_distance_km, duration_seconds),
        max_speed_kmh: max_speed_kmh(samples),
        elevation: elevation(samples),
    }
}
