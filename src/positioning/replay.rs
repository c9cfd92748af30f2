use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Instant,
};

use log::debug;

use crate::{errors::PacetrackError, track::LocationSample};

use super::{PositioningError, PositioningSource};

/// How quickly a scripted source releases its fixes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayPace {
    /// Every pending fix is available as soon as updates start
    Immediate,
    /// Fixes are released following their own timestamps, sped up by the factor
    Realtime { speedup: u32 },
}

/// Observes a scripted source after it has been moved into a session
#[derive(Clone, Debug, Default)]
pub struct SourceProbe {
    streaming: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    cancel_count: Arc<AtomicUsize>,
}

impl SourceProbe {
    /// Whether continuous updates are currently running
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Whether every scripted fix has been delivered
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }
}

/// A positioning source that plays back a fixed script of fixes and failures.
///
/// This allows sessions to be exercised without positioning hardware:
/// - unit and integration tests of the session state machine
/// - replaying a previously captured route from a JSON Lines file
/// - simulating permission refusal or devices with no positioning at all
pub struct ScriptedPositioningSource {
    script: VecDeque<Result<LocationSample, PositioningError>>,
    available: bool,
    permission: Result<(), PositioningError>,
    pace: ReplayPace,
    replay_started: Option<Instant>,
    first_fix_ms: Option<i64>,
    probe: SourceProbe,
}

impl Default for ScriptedPositioningSource {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            available: true,
            permission: Ok(()),
            pace: ReplayPace::Immediate,
            replay_started: None,
            first_fix_ms: None,
            probe: SourceProbe::default(),
        }
    }
}

impl ScriptedPositioningSource {
    pub fn from_samples(samples: Vec<LocationSample>) -> Self {
        Self::from_script(samples.into_iter().map(Ok).collect())
    }

    pub fn from_script(script: Vec<Result<LocationSample, PositioningError>>) -> Self {
        let first_fix_ms = script
            .iter()
            .find_map(|event| event.as_ref().ok().map(|s| s.timestamp_ms));
        Self {
            script: script.into(),
            first_fix_ms,
            ..Default::default()
        }
    }

    /// Load fixes from a JSON Lines file, one `LocationSample` per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not a valid
    /// location sample.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PacetrackError> {
        let samples = serde_jsonlines::json_lines(path.as_ref())
            .map_err(|e| PacetrackError::ReplayFileError { source: e })?
            .collect::<Result<Vec<LocationSample>, std::io::Error>>()
            .map_err(|e| PacetrackError::ReplayFileError { source: e })?;
        debug!(
            "Loaded {} fixes from {}",
            samples.len(),
            path.as_ref().display()
        );
        Ok(Self::from_samples(samples))
    }

    /// A device without any positioning capability
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Default::default()
        }
    }

    pub fn with_permission(mut self, permission: Result<(), PositioningError>) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_pace(mut self, pace: ReplayPace) -> Self {
        self.pace = pace;
        self
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn is_due(&self, sample: &LocationSample) -> bool {
        match (self.pace, self.replay_started, self.first_fix_ms) {
            (ReplayPace::Realtime { speedup }, Some(started), Some(first_ms)) => {
                let elapsed_ms = started.elapsed().as_millis() as i64 * speedup.max(1) as i64;
                sample.timestamp_ms - first_ms <= elapsed_ms
            }
            _ => true,
        }
    }
}

impl PositioningSource for ScriptedPositioningSource {
    fn is_available(&self) -> bool {
        self.available
    }

    fn request_permission(&mut self, _high_accuracy: bool) -> Result<(), PositioningError> {
        self.permission
    }

    fn start_updates(&mut self, _high_accuracy: bool) -> Result<(), PositioningError> {
        self.permission?;
        self.replay_started = Some(Instant::now());
        self.probe.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn poll_fix(&mut self) -> Option<Result<LocationSample, PositioningError>> {
        if !self.probe.is_streaming() {
            return None;
        }
        let Some(next) = self.script.front() else {
            self.probe.exhausted.store(true, Ordering::SeqCst);
            return None;
        };
        let due = match next {
            Ok(sample) => self.is_due(sample),
            Err(_) => true,
        };
        if due { self.script.pop_front() } else { None }
    }

    fn cancel(&mut self) {
        self.probe.streaming.store(false, Ordering::SeqCst);
        self.probe.cancel_count.fetch_add(1, Ordering::SeqCst);
    }
}
