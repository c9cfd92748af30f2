// Tracking session: owns the live sample buffer and the positioning source while recording

mod snapshot;

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::{
    errors::PacetrackError,
    positioning::{PositioningError, PositioningSource},
    recovery::RecoverySnapshot,
    run::RunRecord,
    stats::{RouteStats, aggregate, is_too_short},
    store::Store,
    track::{LocationSample, SignalQuality, now_ms},
    units::UnitSystem,
};

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_SNAPSHOT_INTERVAL_S: u64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopped,
}

/// Notifications delivered to the caller while a session records, in arrival order
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A raw fix was appended to the buffer
    Sample(LocationSample),
    /// Instantaneous signal quality, sent before the matching sample
    Status(SignalQuality),
    /// The source reported a transient failure; recording continues
    SourceError(PositioningError),
    /// The source failed unrecoverably and the session stopped
    Aborted(PositioningError),
}

/// Parameters of a single `start` call
pub struct StartConfig {
    pub high_accuracy: bool,
    /// Unit system the finished run will be recorded with
    pub unit_system: UnitSystem,
    pub events: Option<Sender<SessionEvent>>,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            unit_system: UnitSystem::default(),
            events: None,
        }
    }
}

/// Timing of the session's background workers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// How long the collector waits between drains of the positioning source
    pub poll_interval: Duration,
    /// Cadence of recovery snapshots while active
    pub snapshot_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            snapshot_interval: Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_S),
        }
    }
}

/// Keeps the display awake while recording. Acquiring is best-effort.
pub trait WakeLock: Send {
    fn acquire(&mut self) -> Result<(), String>;
    fn release(&mut self) -> Result<(), String>;
}

/// For platforms without a display to keep awake
pub struct NoWakeLock;

impl WakeLock for NoWakeLock {
    fn acquire(&mut self) -> Result<(), String> {
        Err("no stay-awake lock on this platform".to_string())
    }

    fn release(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// State shared with the worker threads; every mutation goes through its mutex
pub(crate) struct Shared {
    state: SessionState,
    samples: Vec<LocationSample>,
    started_at_ms: Option<i64>,
    wake_lock: Box<dyn WakeLock>,
    wake_lock_held: bool,
}

impl Shared {
    fn release_wake_lock(&mut self) {
        if !self.wake_lock_held {
            return;
        }
        self.wake_lock_held = false;
        if let Err(e) = self.wake_lock.release() {
            debug!("Ignoring stay-awake lock release failure: {}", e);
        }
    }
}

pub(crate) fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // the buffer stays consistent even if a worker panicked mid-append
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Worker<T> {
    stop_tx: Sender<()>,
    handle: JoinHandle<T>,
}

impl<T> Worker<T> {
    fn stop_and_join(self) -> thread::Result<T> {
        // the worker may already have exited on its own
        let _ = self.stop_tx.send(());
        self.handle.join()
    }
}

/// A single recording session.
///
/// States move `Idle -> Starting -> Active -> Stopped -> Idle`. While active,
/// a collector thread appends every raw fix to the buffer and a snapshot
/// thread persists the buffer for crash recovery. Both are stopped and
/// joined on every exit from `Active`.
pub struct TrackingSession {
    shared: Arc<Mutex<Shared>>,
    store: Arc<dyn Store>,
    options: SessionOptions,
    /// Present whenever no collector owns it
    source: Option<Box<dyn PositioningSource>>,
    collector: Option<Worker<Box<dyn PositioningSource>>>,
    snapshotter: Option<Worker<()>>,
    unit_system: UnitSystem,
    resuming: bool,
}

impl TrackingSession {
    pub fn new(
        source: Box<dyn PositioningSource>,
        store: Arc<dyn Store>,
        options: SessionOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                samples: Vec::new(),
                started_at_ms: None,
                wake_lock: Box::new(NoWakeLock),
                wake_lock_held: false,
            })),
            store,
            options,
            source: Some(source),
            collector: None,
            snapshotter: None,
            unit_system: UnitSystem::default(),
            resuming: false,
        }
    }

    pub fn with_wake_lock(self, wake_lock: Box<dyn WakeLock>) -> Self {
        lock_shared(&self.shared).wake_lock = wake_lock;
        self
    }

    pub fn state(&self) -> SessionState {
        lock_shared(&self.shared).state
    }

    /// Copy of the buffered samples, in arrival order
    pub fn samples(&self) -> Vec<LocationSample> {
        lock_shared(&self.shared).samples.clone()
    }

    pub fn sample_count(&self) -> usize {
        lock_shared(&self.shared).samples.len()
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        lock_shared(&self.shared).started_at_ms
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    /// Statistics over the buffer so far, for live display
    pub fn live_stats(&self) -> RouteStats {
        aggregate(&lock_shared(&self.shared).samples)
    }

    /// Begin recording.
    ///
    /// # Errors
    ///
    /// - `UnsupportedDevice` when the source has no positioning capability
    /// - `PermissionDenied`, `PositionUnavailable` or `Timeout` when the
    ///   permission probe or the start of updates fails; the session returns
    ///   to `Idle` with an empty buffer
    pub fn start(&mut self, config: StartConfig) -> Result<(), PacetrackError> {
        let state = self.state();
        if matches!(state, SessionState::Active | SessionState::Starting) {
            warn!("Tracking session is already {:?}, ignoring start", state);
            return Ok(());
        }
        self.reap_workers();

        let Some(mut source) = self.source.take() else {
            return Err(PacetrackError::SessionWorkerPanicked);
        };
        if !source.is_available() {
            self.source = Some(source);
            return Err(PacetrackError::UnsupportedDevice);
        }

        lock_shared(&self.shared).state = SessionState::Starting;
        info!(
            "Starting tracking session (high accuracy: {})",
            config.high_accuracy
        );

        if let Err(e) = source.request_permission(config.high_accuracy) {
            return Err(self.abort_start(source, e));
        }

        {
            let mut shared = lock_shared(&self.shared);
            if self.resuming {
                info!("Resuming with {} recovered samples", shared.samples.len());
            } else {
                shared.samples.clear();
                shared.started_at_ms = Some(now_ms());
            }
        }

        if let Err(e) = source.start_updates(config.high_accuracy) {
            return Err(self.abort_start(source, e));
        }
        self.resuming = false;
        self.unit_system = config.unit_system;

        {
            let mut shared = lock_shared(&self.shared);
            match shared.wake_lock.acquire() {
                Ok(()) => shared.wake_lock_held = true,
                Err(e) => debug!("Stay-awake lock unavailable: {}", e),
            }
            shared.state = SessionState::Active;
        }

        let (snapshot_stop_tx, snapshot_stop_rx) = mpsc::channel();
        let (collector_stop_tx, collector_stop_rx) = mpsc::channel();

        let shared = self.shared.clone();
        let store = self.store.clone();
        let snapshot_interval = self.options.snapshot_interval;
        let snapshot_handle = thread::spawn(move || {
            snapshot::run_snapshots(shared, store, snapshot_stop_rx, snapshot_interval)
        });

        let shared = self.shared.clone();
        let poll_interval = self.options.poll_interval;
        let abort_snapshots = snapshot_stop_tx.clone();
        let events = config.events;
        let collector_handle = thread::spawn(move || {
            collect_fixes(
                source,
                shared,
                events,
                collector_stop_rx,
                abort_snapshots,
                poll_interval,
            )
        });

        self.snapshotter = Some(Worker {
            stop_tx: snapshot_stop_tx,
            handle: snapshot_handle,
        });
        self.collector = Some(Worker {
            stop_tx: collector_stop_tx,
            handle: collector_handle,
        });
        Ok(())
    }

    fn abort_start(
        &mut self,
        mut source: Box<dyn PositioningSource>,
        e: PositioningError,
    ) -> PacetrackError {
        warn!("Could not start tracking: {}", e);
        source.cancel();
        self.source = Some(source);
        self.resuming = false;
        let mut shared = lock_shared(&self.shared);
        shared.state = SessionState::Idle;
        shared.samples.clear();
        shared.started_at_ms = None;
        e.into()
    }

    /// Stop recording and return every buffered sample in arrival order.
    ///
    /// Calling this while not active returns the existing buffer unchanged.
    pub fn stop(&mut self) -> Vec<LocationSample> {
        if self.state() != SessionState::Active {
            warn!("Stop called while tracking session is {:?}", self.state());
            self.reap_workers();
            return self.samples();
        }

        // snapshots first, so none can land after the clear below
        self.join_snapshotter();
        self.join_collector();

        // an abort while joining keeps its snapshot for recovery
        if self.state() == SessionState::Active {
            if let Err(e) = self.store.clear_snapshot() {
                warn!("Could not clear recovery snapshot: {}", e);
            }
        }

        let mut shared = lock_shared(&self.shared);
        shared.release_wake_lock();
        shared.state = SessionState::Stopped;
        info!("Tracking session stopped with {} samples", shared.samples.len());
        shared.samples.clone()
    }

    /// Return to `Idle`, discarding the buffer of a stopped session
    pub fn reset(&mut self) {
        let state = self.state();
        if matches!(state, SessionState::Active | SessionState::Starting) {
            warn!("Cannot reset a session that is {:?}, stop it first", state);
            return;
        }
        self.reap_workers();
        self.resuming = false;
        let mut shared = lock_shared(&self.shared);
        shared.state = SessionState::Idle;
        shared.samples.clear();
        shared.started_at_ms = None;
    }

    /// Seed the buffer from an interrupted session.
    ///
    /// The session stays out of `Active` until `start` re-acquires the
    /// positioning source; that start keeps the seeded samples.
    pub fn resume_from(&mut self, snapshot: RecoverySnapshot) {
        let state = self.state();
        if matches!(state, SessionState::Active | SessionState::Starting) {
            warn!("Cannot resume into a session that is {:?}", state);
            return;
        }
        self.reap_workers();
        info!(
            "Seeding session with {} samples from recovery snapshot",
            snapshot.samples.len()
        );
        let mut shared = lock_shared(&self.shared);
        shared.state = SessionState::Idle;
        shared.samples = snapshot.samples;
        shared.started_at_ms = Some(snapshot.session_start_ms);
        self.resuming = true;
    }

    /// Whether the buffered route is too short to save without confirmation
    pub fn is_too_short(&self) -> bool {
        is_too_short(&lock_shared(&self.shared).samples)
    }

    /// Build the run record for the buffered route
    pub fn to_run_record(&self) -> RunRecord {
        let shared = lock_shared(&self.shared);
        let date_ms = shared
            .started_at_ms
            .or_else(|| shared.samples.first().map(|s| s.timestamp_ms))
            .unwrap_or_else(now_ms);
        RunRecord::from_route(shared.samples.clone(), date_ms, self.unit_system)
    }

    fn join_snapshotter(&mut self) {
        if let Some(worker) = self.snapshotter.take() {
            if worker.stop_and_join().is_err() {
                error!("Snapshot worker panicked");
            }
        }
    }

    fn join_collector(&mut self) {
        if let Some(worker) = self.collector.take() {
            match worker.stop_and_join() {
                Ok(source) => self.source = Some(source),
                Err(_) => error!("{}", PacetrackError::SessionWorkerPanicked),
            }
        }
    }

    /// Join workers that exited on their own, e.g. after an aborted session
    fn reap_workers(&mut self) {
        self.join_snapshotter();
        self.join_collector();
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.reap_workers();
        lock_shared(&self.shared).release_wake_lock();
    }
}

/// Hands events to the caller, dropping the channel once its receiver is gone
fn notify(events: &mut Option<Sender<SessionEvent>>, event: SessionEvent) {
    if let Some(sender) = events {
        if let Err(e) = sender.send(event) {
            warn!("Session event receiver disconnected: {}", e);
            *events = None;
        }
    }
}

fn should_stop(stop_rx: &Receiver<()>, wait: Duration) -> bool {
    !matches!(stop_rx.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
}

/// Collector loop: drain the source, buffer raw fixes and notify the caller.
/// Returns the source, always cancelled, so the session can start again.
fn collect_fixes(
    mut source: Box<dyn PositioningSource>,
    shared: Arc<Mutex<Shared>>,
    mut events: Option<Sender<SessionEvent>>,
    stop_rx: Receiver<()>,
    abort_snapshots: Sender<()>,
    poll_interval: Duration,
) -> Box<dyn PositioningSource> {
    'collect: loop {
        while let Some(update) = source.poll_fix() {
            match update {
                Ok(sample) => {
                    {
                        let mut shared = lock_shared(&shared);
                        if shared.state != SessionState::Active {
                            break 'collect;
                        }
                        shared.samples.push(sample.clone());
                    }
                    debug!(
                        "Fix {:.6},{:.6} accuracy {:?}",
                        sample.latitude, sample.longitude, sample.accuracy_m
                    );
                    notify(&mut events, SessionEvent::Status(sample.signal_quality()));
                    notify(&mut events, SessionEvent::Sample(sample));
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Positioning source reported {}, still recording", e);
                    notify(&mut events, SessionEvent::Status(SignalQuality::Error));
                    notify(&mut events, SessionEvent::SourceError(e));
                }
                Err(e) => {
                    error!("Positioning failed unrecoverably: {}", e);
                    {
                        let mut shared = lock_shared(&shared);
                        shared.release_wake_lock();
                        shared.state = SessionState::Stopped;
                    }
                    let _ = abort_snapshots.send(());
                    notify(&mut events, SessionEvent::Aborted(e));
                    break 'collect;
                }
            }
            if should_stop(&stop_rx, Duration::ZERO) {
                break 'collect;
            }
        }
        if should_stop(&stop_rx, poll_interval) {
            break;
        }
    }
    source.cancel();
    source
}
