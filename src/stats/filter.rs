use itertools::Itertools;

use crate::{geodesy::distance_km, track::LocationSample};

/// Fixes with an accuracy radius above this are not trusted for distance
pub const MAX_ACCURACY_M: f64 = 50.;
/// Fastest plausible running speed; faster segments are GPS jitter
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 25.;

const MS_PER_HOUR: f64 = 3_600_000.;

/// The interval between two consecutive samples
#[derive(Clone, Copy, Debug)]
pub struct Segment<'a> {
    pub prev: &'a LocationSample,
    pub curr: &'a LocationSample,
    pub distance_km: f64,
    pub elapsed_ms: i64,
}

impl<'a> Segment<'a> {
    pub fn new(prev: &'a LocationSample, curr: &'a LocationSample) -> Self {
        Self {
            prev,
            curr,
            distance_km: distance_km(prev.coordinate(), curr.coordinate()),
            elapsed_ms: curr.timestamp_ms - prev.timestamp_ms,
        }
    }

    /// Implied speed over the segment, `None` when no time elapsed
    pub fn speed_kmh(&self) -> Option<f64> {
        if self.elapsed_ms <= 0 {
            return None;
        }
        Some(self.distance_km / (self.elapsed_ms as f64 / MS_PER_HOUR))
    }

    pub fn is_valid(&self) -> bool {
        if exceeds_accuracy(self.prev) || exceeds_accuracy(self.curr) {
            return false;
        }
        match self.speed_kmh() {
            Some(speed) => speed <= MAX_PLAUSIBLE_SPEED_KMH,
            None => false,
        }
    }
}

fn exceeds_accuracy(sample: &LocationSample) -> bool {
    sample.accuracy_m.is_some_and(|acc| acc > MAX_ACCURACY_M)
}

/// Validity gate for the segment between two consecutive samples.
///
/// A segment is rejected when either endpoint reports an accuracy worse than
/// [`MAX_ACCURACY_M`], when no time elapsed between the samples, or when the
/// implied speed exceeds [`MAX_PLAUSIBLE_SPEED_KMH`]. Rejected segments
/// contribute nothing to distance or speed but never stop later segments from
/// being evaluated.
pub fn is_segment_valid(prev: &LocationSample, curr: &LocationSample) -> bool {
    Segment::new(prev, curr).is_valid()
}

/// All consecutive segments of a route, valid or not, in order
pub fn segments(samples: &[LocationSample]) -> impl Iterator<Item = Segment<'_>> {
    samples
        .iter()
        .tuple_windows()
        .map(|(prev, curr)| Segment::new(prev, curr))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~111 m north of the origin
    const LAT_STEP_100M: f64 = 0.001;

    #[test]
    fn test_plausible_segment_is_valid() {
        let prev = LocationSample::new(0., 0., 0);
        // 111 m in 60 s is ~6.7 km/h
        let curr = LocationSample::new(LAT_STEP_100M, 0., 60_000);
        assert!(is_segment_valid(&prev, &curr));
    }

    #[test]
    fn test_implausible_speed_rejected() {
        let prev = LocationSample::new(0., 0., 0);
        // 111 m in 10 s is ~40 km/h
        let curr = LocationSample::new(LAT_STEP_100M, 0., 10_000);
        assert!(!is_segment_valid(&prev, &curr));
    }

    #[test]
    fn test_non_positive_elapsed_rejected() {
        let prev = LocationSample::new(0., 0., 5_000);
        let same_time = LocationSample::new(LAT_STEP_100M, 0., 5_000);
        let earlier = LocationSample::new(LAT_STEP_100M, 0., 1_000);
        assert!(!is_segment_valid(&prev, &same_time));
        assert!(!is_segment_valid(&prev, &earlier));

        // a stationary runner with no elapsed time is also rejected
        assert!(!is_segment_valid(&prev, &prev.clone()));
    }

    #[test]
    fn test_poor_accuracy_rejected_on_either_end() {
        let good = LocationSample::new(0., 0., 0).with_accuracy(5.);
        let bad = LocationSample::new(LAT_STEP_100M, 0., 60_000).with_accuracy(51.);
        assert!(!is_segment_valid(&good, &bad));

        let bad_start = LocationSample::new(0., 0., 0).with_accuracy(80.);
        let good_end = LocationSample::new(LAT_STEP_100M, 0., 60_000).with_accuracy(5.);
        assert!(!is_segment_valid(&bad_start, &good_end));

        // exactly at the limit is still accepted
        let edge = LocationSample::new(LAT_STEP_100M, 0., 60_000).with_accuracy(50.);
        assert!(is_segment_valid(&good, &edge));
    }

    #[test]
    fn test_segments_iterates_pairs() {
        let samples = vec![
            LocationSample::new(0., 0., 0),
            LocationSample::new(LAT_STEP_100M, 0., 60_000),
            LocationSample::new(2. * LAT_STEP_100M, 0., 120_000),
        ];
        let segs: Vec<_> = segments(&samples).collect();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].elapsed_ms, 60_000);
        assert!(segments(&samples[..1]).next().is_none());
    }
}
