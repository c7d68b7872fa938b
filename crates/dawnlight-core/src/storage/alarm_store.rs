//! Alarm storage and persistence.
//!
//! Alarms live in `alarms.toml` in the data directory as an array of
//! `[[alarms]]` tables. Stored order is file order.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data_dir;
use crate::alarm::{AlarmPatch, AlarmRecord, AlarmRepository};
use crate::error::{CoreError, RepositoryError};
use crate::lock;

/// File-backed alarm repository.
pub struct AlarmStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write: Mutex<()>,
}

/// Wrapper for serializing alarms to TOML
#[derive(Serialize, Deserialize, Default)]
struct AlarmsFile {
    #[serde(default)]
    alarms: Vec<AlarmRecord>,
}

impl AlarmStore {
    /// Open the alarm store in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn open() -> Result<Self, CoreError> {
        Ok(Self::with_path(data_dir()?.join("alarms.toml")))
    }

    /// Create an alarm store backed by `path`. The file is created on first save.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            write: Mutex::new(()),
        }
    }

    /// Get the alarms file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all alarms. A missing file is an empty list.
    ///
    /// # Errors
    /// Unreadable or malformed files.
    pub fn load_all(&self) -> Result<Vec<AlarmRecord>, RepositoryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RepositoryError::Unavailable(format!(
                    "{}: {e}",
                    self.path.display()
                )))
            }
        };
        let file: AlarmsFile = toml::from_str(&content).map_err(|e| RepositoryError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok(file.alarms)
    }

    /// Replace the stored alarms.
    ///
    /// # Errors
    /// Serialization or write failures.
    pub fn save_all(&self, alarms: &[AlarmRecord]) -> Result<(), RepositoryError> {
        let file = AlarmsFile {
            alarms: alarms.to_vec(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| RepositoryError::Unavailable(format!("serialize alarms: {e}")))?;
        std::fs::write(&self.path, content)
            .map_err(|e| RepositoryError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    /// Store a new alarm. Assigns an id when `draft.id` is empty, stamps
    /// `created_at` and enables it.
    ///
    /// # Errors
    /// Invalid records and storage failures.
    pub fn add(&self, mut draft: AlarmRecord) -> Result<AlarmRecord, CoreError> {
        draft.validate()?;
        if draft.id.is_empty() {
            draft.id = Uuid::new_v4().to_string();
        }
        draft.enabled = true;
        draft.created_at = Some(Utc::now());

        let _guard = lock(&self.write);
        let mut alarms = self.load_all()?;
        if alarms.iter().any(|a| a.id == draft.id) {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "id".into(),
                message: format!("alarm '{}' already exists", draft.id),
            }
            .into());
        }
        alarms.push(draft.clone());
        self.save_all(&alarms)?;
        tracing::info!(alarm = %draft.id, time = %draft.time_label(), "alarm added");
        Ok(draft)
    }

    /// Apply `patch` to the alarm with `id`.
    ///
    /// # Errors
    /// Unknown ids, a patch that leaves the record invalid, storage failures.
    pub fn update(&self, id: &str, patch: &AlarmPatch) -> Result<AlarmRecord, CoreError> {
        let _guard = lock(&self.write);
        let mut alarms = self.load_all()?;
        let alarm = alarms
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let mut updated = alarm.clone();
        patch.apply(&mut updated);
        updated.validate()?;
        *alarm = updated.clone();
        self.save_all(&alarms)?;
        Ok(updated)
    }

    /// Returns false when no alarm has that id.
    ///
    /// # Errors
    /// Storage failures.
    pub fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let _guard = lock(&self.write);
        let mut alarms = self.load_all()?;
        let before = alarms.len();
        alarms.retain(|a| a.id != id);
        if alarms.len() == before {
            return Ok(false);
        }
        self.save_all(&alarms)?;
        Ok(true)
    }

    /// Flip the enabled flag.
    ///
    /// # Errors
    /// Unknown ids and storage failures.
    pub fn toggle(&self, id: &str) -> Result<AlarmRecord, RepositoryError> {
        let _guard = lock(&self.write);
        let mut alarms = self.load_all()?;
        let alarm = alarms
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        alarm.enabled = !alarm.enabled;
        let toggled = alarm.clone();
        self.save_all(&alarms)?;
        Ok(toggled)
    }

    /// # Errors
    /// Storage failures.
    pub fn get(&self, id: &str) -> Result<Option<AlarmRecord>, RepositoryError> {
        Ok(self.load_all()?.into_iter().find(|a| a.id == id))
    }
}

impl AlarmRepository for AlarmStore {
    fn list(&self) -> Result<Vec<AlarmRecord>, RepositoryError> {
        self.load_all()
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<AlarmRecord>, RepositoryError> {
        let _guard = lock(&self.write);
        let mut alarms = self.load_all()?;
        let Some(alarm) = alarms.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        alarm.enabled = enabled;
        let updated = alarm.clone();
        self.save_all(&alarms)?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmSound;
    use tempfile::TempDir;

    fn store() -> (TempDir, AlarmStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AlarmStore::with_path(dir.path().join("alarms.toml"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load_all().unwrap().is_empty());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn add_assigns_id_and_timestamp() {
        let (_dir, store) = store();
        let added = store
            .add(AlarmRecord::new("", 6, 30).with_repeat([1, 2]).disabled())
            .unwrap();
        assert!(!added.id.is_empty());
        assert!(added.enabled);
        assert!(added.created_at.is_some());
        assert_eq!(store.get(&added.id).unwrap(), Some(added));
    }

    #[test]
    fn add_rejects_invalid_records() {
        let (_dir, store) = store();
        let err = store.add(AlarmRecord::new("", 24, 0)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn stored_order_survives_a_roundtrip() {
        let (_dir, store) = store();
        for (id, hour) in [("b", 8), ("a", 6), ("c", 7)] {
            store.add(AlarmRecord::new(id, hour, 0)).unwrap();
        }
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn update_toggle_delete() {
        let (_dir, store) = store();
        store.add(AlarmRecord::new("a", 6, 0)).unwrap();

        let patch = AlarmPatch {
            sound: Some(AlarmSound::Rain),
            sunrise_duration: Some(15),
            ..AlarmPatch::default()
        };
        let updated = store.update("a", &patch).unwrap();
        assert_eq!(updated.sound, AlarmSound::Rain);
        assert_eq!(updated.sunrise_duration, 15);

        let bad = AlarmPatch {
            repeat: Some(vec![1, 1]),
            ..AlarmPatch::default()
        };
        assert!(store.update("a", &bad).is_err());
        assert!(store.get("a").unwrap().unwrap().repeat.is_empty());

        assert!(!store.toggle("a").unwrap().enabled);
        assert!(store.toggle("a").unwrap().enabled);
        assert!(matches!(store.toggle("zzz"), Err(RepositoryError::NotFound(_))));

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
    }

    #[test]
    fn set_enabled_persists() {
        let (_dir, store) = store();
        store.add(AlarmRecord::new("a", 6, 0)).unwrap();
        assert!(store.set_enabled("zzz", false).unwrap().is_none());
        store.set_enabled("a", false).unwrap();

        let reopened = AlarmStore::with_path(store.path().to_path_buf());
        assert!(!reopened.get("a").unwrap().unwrap().enabled);
    }

    #[test]
    fn malformed_file_is_reported() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "[[alarms]]\nhour = \"seven\"\n").unwrap();
        assert!(matches!(store.load_all(), Err(RepositoryError::Corrupt { .. })));
    }

    #[test]
    fn hand_written_file_uses_defaults() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "[[alarms]]\nid = \"x\"\nhour = 7\nminute = 15\n").unwrap();
        let alarm = store.get("x").unwrap().unwrap();
        assert!(alarm.enabled);
        assert_eq!(alarm.sunrise_duration, 30);
        assert_eq!(alarm.sound, AlarmSound::Birds);
    }
}
