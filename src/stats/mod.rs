// Route statistics: segment filtering, aggregation and splits

pub mod aggregator;
pub mod filter;
pub mod splits;

pub use aggregator::{Elevation, RouteStats, aggregate};
pub use filter::{Segment, is_segment_valid};
pub use splits::{Split, calculate_splits};

use crate::{track::LocationSample, units::UnitSystem};

/// Runs shorter than this need explicit confirmation before saving
pub const MIN_RUN_DISTANCE_KM: f64 = 0.1;
/// Runs shorter than this need explicit confirmation before saving
pub const MIN_RUN_DURATION_S: u64 = 30;

/// Everything derived from a route at stop time
#[derive(Clone, Debug, PartialEq)]
pub struct RunStats {
    pub route: RouteStats,
    pub splits: Vec<Split>,
    pub point_count: usize,
}

pub fn calculate_all_stats(samples: &[LocationSample], unit: UnitSystem) -> RunStats {
    RunStats {
        route: aggregate(samples),
        splits: calculate_splits(samples, unit),
        point_count: samples.len(),
    }
}

/// Whether a finished route is too short to save without asking the runner
pub fn is_too_short(samples: &[LocationSample]) -> bool {
    let stats = aggregate(samples);
    is_too_short_stats(&stats)
}

pub fn is_too_short_stats(stats: &RouteStats) -> bool {
    stats.total_distance_km < MIN_RUN_DISTANCE_KM || stats.duration_seconds < MIN_RUN_DURATION_S
}
