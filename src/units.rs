use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uom::si::{
    f64::Length,
    length::{kilometer, mile},
};

/// Display unit system. Stored values are always metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSystem {
    #[default]
    #[serde(rename = "km")]
    Metric,
    #[serde(rename = "mi")]
    Imperial,
}

impl UnitSystem {
    /// Number of display units in one kilometer
    pub fn units_per_km(&self) -> f64 {
        match self {
            UnitSystem::Metric => 1.,
            UnitSystem::Imperial => Length::new::<kilometer>(1.).get::<mile>(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "km",
            UnitSystem::Imperial => "mi",
        }
    }

    pub fn speed_label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "km/h",
            UnitSystem::Imperial => "mph",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "km" | "metric" => Ok(UnitSystem::Metric),
            "mi" | "imperial" => Ok(UnitSystem::Imperial),
            other => Err(format!("unknown unit system '{}', expected km or mi", other)),
        }
    }
}

/// Convert a canonical kilometer distance into the display unit
pub fn convert_distance(km: f64, units: UnitSystem) -> f64 {
    km * units.units_per_km()
}

/// Convert a pace in seconds per kilometer into seconds per display unit
pub fn convert_pace(sec_per_km: f64, units: UnitSystem) -> f64 {
    sec_per_km / units.units_per_km()
}

/// Format a duration as `H:MM:SS`, or `M:SS` when under an hour
pub fn format_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Format a pace as `M:SS`. A zero pace means "undefined" and renders as `-`.
pub fn format_pace(sec_per_unit: f64) -> String {
    if !sec_per_unit.is_finite() || sec_per_unit <= 0. {
        return "-".to_string();
    }
    let total = sec_per_unit.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_distance(km: f64, units: UnitSystem) -> String {
    format!("{:.2}", convert_distance(km, units))
}

pub fn format_speed(kmh: f64, units: UnitSystem) -> String {
    format!("{:.1}", convert_distance(kmh, units))
}
