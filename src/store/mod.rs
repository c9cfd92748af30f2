// Persistence of completed runs, user settings and recovery snapshots

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    errors::PacetrackError, recovery::RecoverySnapshot, run::RunRecord, track::now_ms,
    units::UnitSystem,
};

pub const UNITS_SETTING: &str = "units";
pub const HIGH_ACCURACY_SETTING: &str = "high_accuracy";

/// Trait defining the interface the tracking core needs from persistence
pub trait Store: Send + Sync {
    /// Persist a finished run, assigning and returning its id
    fn save_completed_run(&self, run: &mut RunRecord) -> Result<String, PacetrackError>;

    /// All saved runs, newest first
    fn load_all_runs(&self) -> Result<Vec<RunRecord>, PacetrackError>;

    fn load_run(&self, id: &str) -> Result<Option<RunRecord>, PacetrackError>;

    fn delete_run(&self, id: &str) -> Result<(), PacetrackError>;

    fn get_setting(&self, key: &str) -> Result<Option<String>, PacetrackError>;

    fn set_setting(&self, key: &str, value: &str) -> Result<(), PacetrackError>;

    fn save_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), PacetrackError>;

    fn load_snapshot(&self) -> Result<Option<RecoverySnapshot>, PacetrackError>;

    fn clear_snapshot(&self) -> Result<(), PacetrackError>;

    /// Remove all runs, settings and any snapshot
    fn clear_all(&self) -> Result<(), PacetrackError>;

    fn get_setting_or(&self, key: &str, default: &str) -> Result<String, PacetrackError> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn units(&self) -> Result<UnitSystem, PacetrackError> {
        let value = self.get_setting_or(UNITS_SETTING, UnitSystem::default().label())?;
        value
            .parse()
            .map_err(|reason| PacetrackError::InvalidSetting {
                key: UNITS_SETTING.to_string(),
                reason,
            })
    }

    fn set_units(&self, units: UnitSystem) -> Result<(), PacetrackError> {
        self.set_setting(UNITS_SETTING, units.label())
    }

    fn high_accuracy(&self) -> Result<bool, PacetrackError> {
        let value = self.get_setting_or(HIGH_ACCURACY_SETTING, "true")?;
        value
            .parse()
            .map_err(|_| PacetrackError::InvalidSetting {
                key: HIGH_ACCURACY_SETTING.to_string(),
                reason: format!("expected true or false, found '{}'", value),
            })
    }

    fn set_high_accuracy(&self, enabled: bool) -> Result<(), PacetrackError> {
        self.set_setting(HIGH_ACCURACY_SETTING, if enabled { "true" } else { "false" })
    }

    fn last_run(&self) -> Result<Option<RunRecord>, PacetrackError> {
        Ok(self.load_all_runs()?.into_iter().next())
    }

    fn has_runs(&self) -> Result<bool, PacetrackError> {
        Ok(!self.load_all_runs()?.is_empty())
    }

    fn history_summary(&self) -> Result<HistorySummary, PacetrackError> {
        Ok(HistorySummary::from_runs(&self.load_all_runs()?))
    }
}

/// Totals across every saved run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_runs: usize,
    pub total_distance_km: f64,
    pub total_duration_seconds: u64,
    /// Seconds per kilometer across all runs, zero when no distance was run
    pub avg_pace_sec_per_km: f64,
}

impl HistorySummary {
    pub fn from_runs(runs: &[RunRecord]) -> Self {
        let total_distance_km: f64 = runs.iter().map(|run| run.distance_km).sum();
        let total_duration_seconds: u64 = runs.iter().map(|run| run.duration_seconds).sum();
        Self {
            total_runs: runs.len(),
            total_distance_km,
            total_duration_seconds,
            avg_pace_sec_per_km: if total_distance_km > 0. {
                total_duration_seconds as f64 / total_distance_km
            } else {
                0.
            },
        }
    }
}

static RUN_ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Opaque, process-unique run id
pub(crate) fn new_run_id() -> String {
    let seq = RUN_ID_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("run_{}_{:04}", now_ms(), seq % 10_000)
}

/// Newest first, ties broken by id for a stable order
pub(crate) fn sort_newest_first(runs: &mut [RunRecord]) {
    runs.sort_by(|a, b| b.date_ms.cmp(&a.date_ms).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::LocationSample;

    fn run_at(date_ms: i64) -> RunRecord {
        RunRecord::from_route(
            vec![
                LocationSample::new(0., 0., date_ms),
                LocationSample::new(0.0045, 0., date_ms + 180_000),
            ],
            date_ms,
            UnitSystem::Metric,
        )
    }

    #[test]
    fn test_history_summary() {
        assert_eq!(HistorySummary::from_runs(&[]), HistorySummary::default());

        let runs = vec![run_at(0), run_at(1_000_000)];
        let summary = HistorySummary::from_runs(&runs);
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.total_duration_seconds, 360);
        assert!((summary.total_distance_km - 1.0).abs() < 0.01);
        assert!((summary.avg_pace_sec_per_km - 360.).abs() < 1.);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert!(a.starts_with("run_"));
    }

    #[test]
    fn test_typed_settings() {
        let store = MemoryStore::new();
        assert_eq!(store.units().unwrap(), UnitSystem::Metric);
        assert!(store.high_accuracy().unwrap());

        store.set_units(UnitSystem::Imperial).unwrap();
        store.set_high_accuracy(false).unwrap();
        assert_eq!(store.units().unwrap(), UnitSystem::Imperial);
        assert!(!store.high_accuracy().unwrap());

        store.set_setting(UNITS_SETTING, "leagues").unwrap();
        assert!(matches!(
            store.units(),
            Err(PacetrackError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_last_run_is_newest() {
        let store = MemoryStore::new();
        assert!(!store.has_runs().unwrap());
        assert!(store.last_run().unwrap().is_none());

        store.save_completed_run(&mut run_at(5_000)).unwrap();
        let newest = store.save_completed_run(&mut run_at(9_000)).unwrap();
        store.save_completed_run(&mut run_at(1_000)).unwrap();

        assert!(store.has_runs().unwrap());
        assert_eq!(store.last_run().unwrap().unwrap().id, Some(newest));
    }
}
