pub mod replay;

pub use replay::{ReplayPace, ScriptedPositioningSource, SourceProbe};

use snafu::Snafu;

use crate::track::LocationSample;

/// Failure codes a positioning source can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum PositioningError {
    #[snafu(display("permission denied"))]
    PermissionDenied,
    #[snafu(display("position unavailable"))]
    PositionUnavailable,
    #[snafu(display("timeout"))]
    Timeout,
}

impl PositioningError {
    /// Whether recording can carry on after the source reported this failure
    /// mid-session. A revoked permission ends the session; a lost fix or a
    /// slow fix does not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PositioningError::PermissionDenied)
    }
}

/// A source of location fixes, such as a device GNSS receiver.
///
/// The source is owned by the tracking session while it records and is
/// driven from the session's collector thread. Implementations may be backed
/// by real hardware or by a scripted sequence of fixes for tests and replays.
///
/// # Lifecycle
///
/// 1. `is_available()` is checked once when a session starts
/// 2. `request_permission()` performs the one-shot permission probe
/// 3. `start_updates()` begins continuous positioning
/// 4. `poll_fix()` is called repeatedly to drain fixes in arrival order
/// 5. `cancel()` ends the subscription; it is always called when recording ends
pub trait PositioningSource: Send {
    /// Whether the device has any positioning capability at all.
    fn is_available(&self) -> bool;

    /// Ask for permission to read the position, waiting for a first fix.
    ///
    /// # Errors
    ///
    /// Returns the source's failure code when permission is refused, no
    /// position can be determined, or the probe times out.
    fn request_permission(&mut self, high_accuracy: bool) -> Result<(), PositioningError>;

    /// Begin continuous position updates.
    fn start_updates(&mut self, high_accuracy: bool) -> Result<(), PositioningError>;

    /// Next pending update, or `None` when nothing new has arrived yet.
    fn poll_fix(&mut self) -> Option<Result<LocationSample, PositioningError>>;

    /// Stop continuous updates. Must be safe to call more than once.
    fn cancel(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PacetrackError;

    #[test]
    fn test_recoverable_errors() {
        assert!(!PositioningError::PermissionDenied.is_recoverable());
        assert!(PositioningError::PositionUnavailable.is_recoverable());
        assert!(PositioningError::Timeout.is_recoverable());
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            PacetrackError::from(PositioningError::PermissionDenied),
            PacetrackError::PermissionDenied
        ));
        assert!(matches!(
            PacetrackError::from(PositioningError::PositionUnavailable),
            PacetrackError::PositionUnavailable
        ));
        assert!(matches!(
            PacetrackError::from(PositioningError::Timeout),
            PacetrackError::Timeout
        ));
    }
}
