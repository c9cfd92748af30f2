// The durable record of a finished run

use serde::{Deserialize, Serialize};

use crate::{
    errors::PacetrackError,
    stats::{Elevation, Split, calculate_all_stats},
    track::LocationSample,
    units::UnitSystem,
};

/// A completed run as handed to the persistence collaborator.
///
/// Distance, pace, speed, splits and elevation are always derived from
/// `route` by [`RunRecord::from_route`]; they are never set independently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Assigned by the store on first save
    pub id: Option<String>,
    /// Session start, milliseconds since the unix epoch
    pub date_ms: i64,
    pub duration_seconds: u64,
    pub distance_km: f64,
    pub avg_pace_sec_per_km: f64,
    pub max_speed_kmh: f64,
    pub splits: Vec<Split>,
    pub elevation: Option<Elevation>,
    pub route: Vec<LocationSample>,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub unit_system_at_save: UnitSystem,
}

impl RunRecord {
    pub fn from_route(route: Vec<LocationSample>, date_ms: i64, unit: UnitSystem) -> Self {
        let stats = calculate_all_stats(&route, unit);
        Self {
            id: None,
            date_ms,
            duration_seconds: stats.route.duration_seconds,
            distance_km: stats.route.total_distance_km,
            avg_pace_sec_per_km: stats.route.avg_pace_sec_per_km,
            max_speed_kmh: stats.route.max_speed_kmh,
            splits: stats.splits,
            elevation: stats.route.elevation,
            route,
            name: None,
            notes: None,
            unit_system_at_save: unit,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub fn set_name(&mut self, name: Option<String>) -> Result<(), PacetrackError> {
        self.ensure_editable()?;
        self.name = normalize_text(name);
        Ok(())
    }

    pub fn set_notes(&mut self, notes: Option<String>) -> Result<(), PacetrackError> {
        self.ensure_editable()?;
        self.notes = normalize_text(notes);
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), PacetrackError> {
        match &self.id {
            Some(id) => Err(PacetrackError::RunAlreadySaved { id: id.clone() }),
            None => Ok(()),
        }
    }
}

fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
