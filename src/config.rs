use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{PacetrackError, session::SessionOptions};

const APP_DIR_NAME: &str = "pacetrack";
const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_SNAPSHOT_INTERVAL_S: u64 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Where runs, settings and snapshots are kept; the platform data dir when unset
    pub data_dir: Option<PathBuf>,
    pub snapshot_interval_s: u64,
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            snapshot_interval_s: DEFAULT_SNAPSHOT_INTERVAL_S,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, PacetrackError> {
        Ok(dirs::config_dir()
            .ok_or(PacetrackError::NoConfigDir)?
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// The saved config, or `None` if it has never been saved
    pub fn from_local_file() -> Result<Option<Self>, PacetrackError> {
        Self::from_path(&Self::config_path()?)
    }

    pub fn from_path(config_path: &Path) -> Result<Option<Self>, PacetrackError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file =
            fs::File::open(config_path).map_err(|e| PacetrackError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| PacetrackError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), PacetrackError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), PacetrackError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| PacetrackError::ConfigIOError { source: e })?;
        }
        let file = fs::File::create(config_path)
            .map_err(|e| PacetrackError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| PacetrackError::ConfigSerializeError { source: e })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            snapshot_interval: Duration::from_secs(self.snapshot_interval_s.max(1)),
        }
    }
}
