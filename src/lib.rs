// Library interface for pacetrack
// This allows integration tests and benches to access internal modules

pub mod config;
pub mod errors;
pub mod export;
pub mod geodesy;
pub mod positioning;
pub mod recovery;
pub mod run;
pub mod session;
pub mod stats;
pub mod store;
pub mod track;
pub mod units;

// Re-export commonly used types
pub use errors::PacetrackError;
pub use positioning::{PositioningError, PositioningSource, ScriptedPositioningSource};
pub use recovery::{RecoveryOutcome, RecoverySnapshot, check_for_recovery};
pub use run::RunRecord;
pub use session::{SessionEvent, SessionOptions, SessionState, StartConfig, TrackingSession};
pub use stats::{RouteStats, Split, calculate_all_stats};
pub use store::{FileStore, MemoryStore, Store};
pub use track::{LocationSample, SignalQuality};
pub use units::UnitSystem;
