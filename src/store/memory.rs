use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::{errors::PacetrackError, recovery::RecoverySnapshot, run::RunRecord};

use super::{Store, new_run_id, sort_newest_first};

#[derive(Default)]
struct MemoryState {
    runs: HashMap<String, RunRecord>,
    settings: HashMap<String, String>,
    snapshot: Option<RecoverySnapshot>,
}

/// Volatile store, used by tests and by callers that persist elsewhere
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_snapshot_writes: AtomicBool,
    snapshot_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose snapshot writes always fail
    pub fn with_failing_snapshots() -> Self {
        let store = Self::default();
        store.fail_snapshot_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Number of snapshot writes attempted, successful or not
    pub fn snapshot_writes(&self) -> usize {
        self.snapshot_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // a panicked writer cannot leave the maps half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn save_completed_run(&self, run: &mut RunRecord) -> Result<String, PacetrackError> {
        if let Some(id) = &run.id {
            return Err(PacetrackError::RunAlreadySaved { id: id.clone() });
        }
        let id = new_run_id();
        let mut saved = run.clone();
        saved.id = Some(id.clone());
        self.lock().runs.insert(id.clone(), saved);
        run.id = Some(id.clone());
        Ok(id)
    }

    fn load_all_runs(&self) -> Result<Vec<RunRecord>, PacetrackError> {
        let mut runs: Vec<RunRecord> = self.lock().runs.values().cloned().collect();
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn load_run(&self, id: &str) -> Result<Option<RunRecord>, PacetrackError> {
        Ok(self.lock().runs.get(id).cloned())
    }

    fn delete_run(&self, id: &str) -> Result<(), PacetrackError> {
        self.lock()
            .runs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PacetrackError::RunNotFound { id: id.to_string() })
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, PacetrackError> {
        Ok(self.lock().settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), PacetrackError> {
        self.lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn save_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), PacetrackError> {
        self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot_writes.load(Ordering::SeqCst) {
            return Err(PacetrackError::SnapshotWrite {
                reason: "snapshot storage is unavailable".to_string(),
            });
        }
        self.lock().snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<RecoverySnapshot>, PacetrackError> {
        Ok(self.lock().snapshot.clone())
    }

    fn clear_snapshot(&self) -> Result<(), PacetrackError> {
        self.lock().snapshot = None;
        Ok(())
    }

    fn clear_all(&self) -> Result<(), PacetrackError> {
        *self.lock() = MemoryState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{track::LocationSample, units::UnitSystem};

    #[test]
    fn test_save_assigns_id_once() {
        let store = MemoryStore::new();
        let mut run = RunRecord::from_route(
            vec![LocationSample::new(0., 0., 0)],
            0,
            UnitSystem::Metric,
        );
        let id = store.save_completed_run(&mut run).unwrap();
        assert_eq!(run.id.as_deref(), Some(id.as_str()));
        assert!(matches!(
            store.save_completed_run(&mut run),
            Err(PacetrackError::RunAlreadySaved { .. })
        ));
        assert_eq!(store.load_run(&id).unwrap(), Some(run));

        store.delete_run(&id).unwrap();
        assert!(store.load_run(&id).unwrap().is_none());
        assert!(matches!(
            store.delete_run(&id),
            Err(PacetrackError::RunNotFound { .. })
        ));
    }

    #[test]
    fn test_failing_snapshots() {
        let store = MemoryStore::with_failing_snapshots();
        let snapshot = RecoverySnapshot {
            samples: vec![],
            session_start_ms: 0,
            last_snapshot_ms: 0,
        };
        assert!(store.save_snapshot(&snapshot).is_err());
        assert_eq!(store.snapshot_writes(), 1);
        assert!(store.load_snapshot().unwrap().is_none());
    }
}
