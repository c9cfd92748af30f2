use std::{
    sync::{
        Arc, Mutex,
        mpsc::{Receiver, RecvTimeoutError},
    },
    time::Duration,
};

use log::{debug, warn};

use crate::{
    errors::PacetrackError, recovery::RecoverySnapshot, store::Store, track::now_ms,
};

use super::{SessionState, Shared, lock_shared};

/// Snapshot loop: persist the buffer at a fixed cadence while the session is active.
///
/// Write failures are logged and never end the loop.
pub(crate) fn run_snapshots(
    shared: Arc<Mutex<Shared>>,
    store: Arc<dyn Store>,
    stop_rx: Receiver<()>,
    interval: Duration,
) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let snapshot = {
            let shared = lock_shared(&shared);
            if shared.state != SessionState::Active {
                return;
            }
            if shared.samples.is_empty() {
                continue;
            }
            RecoverySnapshot {
                samples: shared.samples.clone(),
                session_start_ms: shared.started_at_ms.unwrap_or_else(now_ms),
                last_snapshot_ms: now_ms(),
            }
        };

        match store.save_snapshot(&snapshot) {
            Ok(()) => debug!("Saved recovery snapshot of {} samples", snapshot.samples.len()),
            Err(e) => {
                let e = match e {
                    PacetrackError::SnapshotWrite { .. } => e,
                    other => PacetrackError::SnapshotWrite {
                        reason: other.to_string(),
                    },
                };
                warn!("{}", e);
            }
        }
    }
}
