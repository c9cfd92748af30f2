// Crash recovery: periodic snapshots of an active session and the startup check

use log::info;
use serde::{Deserialize, Serialize};

use crate::{errors::PacetrackError, store::Store, track::LocationSample};

/// Snapshots older than this are discarded instead of offered for resume
pub const STALE_AFTER_MS: i64 = 24 * 60 * 60 * 1000;
/// A snapshot needs more than this many samples to be worth resuming
pub const MIN_RESUME_SAMPLES: usize = 10;

/// Point-in-time copy of an active session's buffer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySnapshot {
    pub samples: Vec<LocationSample>,
    pub session_start_ms: i64,
    pub last_snapshot_ms: i64,
}

impl RecoverySnapshot {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.last_snapshot_ms
    }

    pub fn is_stale(&self, now_ms: i64) -> bool {
        self.age_ms(now_ms) > STALE_AFTER_MS
    }
}

/// Result of looking for an interrupted session at startup
#[derive(Clone, Debug, PartialEq)]
pub enum RecoveryOutcome {
    /// Nothing worth offering to the runner
    NoSession,
    /// A snapshot was found but was too old; it has been cleared
    Expired,
    /// An interrupted session the runner can resume or discard
    Resumable(RecoverySnapshot),
}

/// Inspect the store for an interrupted session.
///
/// Stale snapshots are cleared. Snapshots with too few samples are reported
/// as no session but left in place.
pub fn check_for_recovery(
    store: &dyn Store,
    now_ms: i64,
) -> Result<RecoveryOutcome, PacetrackError> {
    let Some(snapshot) = store.load_snapshot()? else {
        return Ok(RecoveryOutcome::NoSession);
    };

    if snapshot.is_stale(now_ms) {
        info!(
            "Discarding recovery snapshot from {} minutes ago",
            snapshot.age_ms(now_ms) / 60_000
        );
        store.clear_snapshot()?;
        return Ok(RecoveryOutcome::Expired);
    }

    if snapshot.samples.len() <= MIN_RESUME_SAMPLES {
        info!(
            "Ignoring recovery snapshot with only {} samples",
            snapshot.samples.len()
        );
        return Ok(RecoveryOutcome::NoSession);
    }

    info!(
        "Found interrupted session with {} samples",
        snapshot.samples.len()
    );
    Ok(RecoveryOutcome::Resumable(snapshot))
}

/// Discard an interrupted session the runner chose not to resume
pub fn decline_recovery(store: &dyn Store) -> Result<(), PacetrackError> {
    info!("Discarding interrupted session");
    store.clear_snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn snapshot(samples: usize, last_snapshot_ms: i64) -> RecoverySnapshot {
        RecoverySnapshot {
            samples: (0..samples)
                .map(|i| LocationSample::new(10. + i as f64 * 1e-4, 20., i as i64 * 5_000))
                .collect(),
            session_start_ms: last_snapshot_ms - 600_000,
            last_snapshot_ms,
        }
    }

    #[test]
    fn test_no_snapshot() {
        let store = MemoryStore::new();
        assert_eq!(
            check_for_recovery(&store, NOW_MS).unwrap(),
            RecoveryOutcome::NoSession
        );
    }

    #[test]
    fn test_stale_snapshot_is_cleared() {
        let store = MemoryStore::new();
        store
            .save_snapshot(&snapshot(50, NOW_MS - 25 * 60 * 60 * 1000))
            .unwrap();
        assert_eq!(
            check_for_recovery(&store, NOW_MS).unwrap(),
            RecoveryOutcome::Expired
        );
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_small_snapshot_is_not_offered() {
        let store = MemoryStore::new();
        store.save_snapshot(&snapshot(10, NOW_MS - 60_000)).unwrap();
        assert_eq!(
            check_for_recovery(&store, NOW_MS).unwrap(),
            RecoveryOutcome::NoSession
        );
        assert!(store.load_snapshot().unwrap().is_some());
    }

    #[test]
    fn test_resumable_then_declined() {
        let store = MemoryStore::new();
        let saved = snapshot(11, NOW_MS - 60_000);
        store.save_snapshot(&saved).unwrap();
        assert_eq!(
            check_for_recovery(&store, NOW_MS).unwrap(),
            RecoveryOutcome::Resumable(saved)
        );

        decline_recovery(&store).unwrap();
        assert_eq!(
            check_for_recovery(&store, NOW_MS).unwrap(),
            RecoveryOutcome::NoSession
        );
    }

    #[test]
    fn test_exactly_a_day_old_is_still_resumable() {
        let store = MemoryStore::new();
        store
            .save_snapshot(&snapshot(20, NOW_MS - STALE_AFTER_MS))
            .unwrap();
        assert!(matches!(
            check_for_recovery(&store, NOW_MS).unwrap(),
            RecoveryOutcome::Resumable(_)
        ));
    }
}
