// File-based persistence: one JSON file per run plus settings and snapshot files

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, info, warn};
use serde::{Serialize, de::DeserializeOwned};

use crate::{errors::PacetrackError, recovery::RecoverySnapshot, run::RunRecord};

use super::{Store, new_run_id, sort_newest_first};

const RUNS_DIR: &str = "runs";
const SETTINGS_FILE: &str = "settings.json";
const SNAPSHOT_FILE: &str = "snapshot.json";

/// File-based implementation of [`Store`].
///
/// Layout under the storage root:
/// - `runs/<id>.json`, one file per saved run
/// - `settings.json`, a flat map of string settings
/// - `snapshot.json`, the recovery snapshot of the session in progress
pub struct FileStore {
    storage_path: PathBuf,
    /// Serializes read-modify-write cycles on the settings file
    settings_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `storage_path`, creating the directories as needed
    pub fn new(storage_path: PathBuf) -> Result<Self, PacetrackError> {
        fs::create_dir_all(storage_path.join(RUNS_DIR))
            .map_err(|e| PacetrackError::StoreIo { source: e })?;
        debug!("Opened run store at {}", storage_path.display());
        Ok(Self {
            storage_path,
            settings_lock: Mutex::new(()),
        })
    }

    /// Create storage in the default application data directory
    pub fn new_default() -> Result<Self, PacetrackError> {
        Self::new(Self::default_storage_path()?)
    }

    pub fn default_storage_path() -> Result<PathBuf, PacetrackError> {
        let app_data_dir = dirs::data_dir().ok_or(PacetrackError::NoConfigDir)?;
        Ok(app_data_dir.join("pacetrack"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn runs_dir(&self) -> PathBuf {
        self.storage_path.join(RUNS_DIR)
    }

    /// Path for a run id, or `None` when the id could escape the runs directory
    fn run_path(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| self.runs_dir().join(format!("{}.json", id)))
    }

    fn read_settings(&self) -> Result<BTreeMap<String, String>, PacetrackError> {
        Ok(read_json(&self.storage_path.join(SETTINGS_FILE))?.unwrap_or_default())
    }
}

/// Read and parse a JSON file, `Ok(None)` if it does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PacetrackError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| PacetrackError::StoreIo { source: e })?;
    let value =
        serde_json::from_str(&content).map_err(|e| PacetrackError::StoreSerialize { source: e })?;
    Ok(Some(value))
}

/// Write to a temporary file first, then atomically move it into place
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PacetrackError> {
    let content =
        serde_json::to_string_pretty(value).map_err(|e| PacetrackError::StoreSerialize { source: e })?;
    let temp_path = path.with_extension("json.tmp");
    {
        let mut temp_file =
            fs::File::create(&temp_path).map_err(|e| PacetrackError::StoreIo { source: e })?;
        temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.sync_all())
            .map_err(|e| PacetrackError::StoreIo { source: e })?;
    }
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        PacetrackError::StoreIo { source: e }
    })
}

fn remove_if_exists(path: &Path) -> Result<(), PacetrackError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PacetrackError::StoreIo { source: e }),
    }
}

impl Store for FileStore {
    fn save_completed_run(&self, run: &mut RunRecord) -> Result<String, PacetrackError> {
        if let Some(id) = &run.id {
            return Err(PacetrackError::RunAlreadySaved { id: id.clone() });
        }
        let id = new_run_id();
        let path = self
            .run_path(&id)
            .ok_or_else(|| PacetrackError::RunNotFound { id: id.clone() })?;

        let mut saved = run.clone();
        saved.id = Some(id.clone());
        write_json_atomic(&path, &saved)?;
        run.id = Some(id.clone());
        info!(
            "Saved run {} ({:.2} km, {} points)",
            id,
            run.distance_km,
            run.route.len()
        );
        Ok(id)
    }

    fn load_all_runs(&self) -> Result<Vec<RunRecord>, PacetrackError> {
        let entries =
            fs::read_dir(self.runs_dir()).map_err(|e| PacetrackError::StoreIo { source: e })?;

        let mut runs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<RunRecord>(&path) {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable run file {}: {}", path.display(), e),
            }
        }
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn load_run(&self, id: &str) -> Result<Option<RunRecord>, PacetrackError> {
        match self.run_path(id) {
            Some(path) => read_json(&path),
            None => Ok(None),
        }
    }

    fn delete_run(&self, id: &str) -> Result<(), PacetrackError> {
        let path = self
            .run_path(id)
            .filter(|path| path.exists())
            .ok_or_else(|| PacetrackError::RunNotFound { id: id.to_string() })?;
        fs::remove_file(&path).map_err(|e| PacetrackError::StoreIo { source: e })?;
        info!("Deleted run {}", id);
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, PacetrackError> {
        let _guard = self
            .settings_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(self.read_settings()?.remove(key))
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), PacetrackError> {
        let _guard = self
            .settings_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut settings = self.read_settings()?;
        settings.insert(key.to_string(), value.to_string());
        write_json_atomic(&self.storage_path.join(SETTINGS_FILE), &settings)
    }

    fn save_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), PacetrackError> {
        write_json_atomic(&self.storage_path.join(SNAPSHOT_FILE), snapshot)
    }

    fn load_snapshot(&self) -> Result<Option<RecoverySnapshot>, PacetrackError> {
        read_json(&self.storage_path.join(SNAPSHOT_FILE))
    }

    fn clear_snapshot(&self) -> Result<(), PacetrackError> {
        remove_if_exists(&self.storage_path.join(SNAPSHOT_FILE))
    }

    fn clear_all(&self) -> Result<(), PacetrackError> {
        let _guard = self
            .settings_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let runs_dir = self.runs_dir();
        if runs_dir.exists() {
            fs::remove_dir_all(&runs_dir).map_err(|e| PacetrackError::StoreIo { source: e })?;
        }
        fs::create_dir_all(&runs_dir).map_err(|e| PacetrackError::StoreIo { source: e })?;
        remove_if_exists(&self.storage_path.join(SETTINGS_FILE))?;
        remove_if_exists(&self.storage_path.join(SNAPSHOT_FILE))?;
        warn!("Cleared all stored runs and settings");
        Ok(())
    }
}
