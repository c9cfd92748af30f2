use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Accuracy at or below this radius is reported as a good signal
const GOOD_ACCURACY_M: f64 = 10.;
/// Accuracy at or below this radius is reported as a medium signal
const MEDIUM_ACCURACY_M: f64 = 30.;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One raw position report as delivered by a positioning source.
///
/// Samples are immutable once created and are ordered by `timestamp_ms`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Altitude above sea level in meters, when the source reports one
    #[serde(default)]
    pub altitude_m: Option<f64>,
    /// Horizontal accuracy radius in meters, when the source reports one
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    /// Milliseconds since the unix epoch
    pub timestamp_ms: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude_m: None,
            accuracy_m: None,
            timestamp_ms,
        }
    }

    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn signal_quality(&self) -> SignalQuality {
        SignalQuality::from_accuracy(self.accuracy_m)
    }
}

/// Instantaneous signal quality shown to the runner while recording
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalQuality {
    Good,
    Medium,
    Poor,
    Unknown,
    /// The positioning source reported a failure
    Error,
}

impl SignalQuality {
    pub fn from_accuracy(accuracy_m: Option<f64>) -> Self {
        match accuracy_m {
            None => SignalQuality::Unknown,
            Some(acc) if acc <= GOOD_ACCURACY_M => SignalQuality::Good,
            Some(acc) if acc <= MEDIUM_ACCURACY_M => SignalQuality::Medium,
            Some(_) => SignalQuality::Poor,
        }
    }
}

/// Current wall-clock time in milliseconds since the unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
