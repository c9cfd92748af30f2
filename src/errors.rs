// Error types for pacetrack

use snafu::Snafu;
use std::io;

use crate::positioning::PositioningError;

#[derive(Debug, Snafu)]
pub enum PacetrackError {
    // Errors while starting a tracking session
    #[snafu(display("Positioning is not available on this device"))]
    UnsupportedDevice,
    #[snafu(display(
        "Location permission was denied. Allow location access in your device settings."
    ))]
    PermissionDenied,
    #[snafu(display("Position is unavailable. Make sure location services are enabled."))]
    PositionUnavailable,
    #[snafu(display("Timed out waiting for a position fix. Try again."))]
    Timeout,
    #[snafu(display("Session worker thread panicked"))]
    SessionWorkerPanicked,

    // Recovery snapshot errors, logged and never propagated out of a live session
    #[snafu(display("Error writing recovery snapshot: {reason}"))]
    SnapshotWrite { reason: String },

    // Persistence errors
    #[snafu(display("Error reading or writing the run store"))]
    StoreIo { source: io::Error },
    #[snafu(display("Error serializing store data"))]
    StoreSerialize { source: serde_json::Error },
    #[snafu(display("Run {id} not found"))]
    RunNotFound { id: String },
    #[snafu(display("Run {id} has already been saved and can no longer be edited"))]
    RunAlreadySaved { id: String },
    #[snafu(display("Invalid setting {key}: {reason}"))]
    InvalidSetting { key: String, reason: String },

    // Export errors
    #[snafu(display("Route has no points to export"))]
    EmptyRoute,
    #[snafu(display("Route export failed: {reason}"))]
    ExportError { reason: String },

    // Replay source errors
    #[snafu(display("Error loading location fixes file"))]
    ReplayFileError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl From<PositioningError> for PacetrackError {
    fn from(value: PositioningError) -> Self {
        match value {
            PositioningError::PermissionDenied => PacetrackError::PermissionDenied,
            PositioningError::PositionUnavailable => PacetrackError::PositionUnavailable,
            PositioningError::Timeout => PacetrackError::Timeout,
        }
    }
}
