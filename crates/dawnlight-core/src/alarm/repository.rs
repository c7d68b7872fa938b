use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::record::AlarmRecord;
use crate::error::RepositoryError;
use crate::lock;

/// Source of alarm definitions, polled by the engine every tick.
///
/// Implementations must be cheap enough to call once per second. A failed
/// `list` makes the engine skip that tick.
pub trait AlarmRepository: Send + Sync {
    fn list(&self) -> Result<Vec<AlarmRecord>, RepositoryError>;

    /// Returns the updated record, or `None` when no alarm has that id.
    fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<AlarmRecord>, RepositoryError>;
}

/// In-process repository. Stored order is insertion order.
#[derive(Debug, Default)]
pub struct MemoryAlarmRepository {
    alarms: Mutex<Vec<AlarmRecord>>,
    offline: AtomicBool,
}

impl MemoryAlarmRepository {
    pub fn new(alarms: Vec<AlarmRecord>) -> Self {
        Self {
            alarms: Mutex::new(alarms),
            offline: AtomicBool::new(false),
        }
    }

    /// Insert, or replace the record with the same id in place.
    pub fn upsert(&self, alarm: AlarmRecord) {
        let mut alarms = lock(&self.alarms);
        match alarms.iter_mut().find(|a| a.id == alarm.id) {
            Some(existing) => *existing = alarm,
            None => alarms.push(alarm),
        }
    }

    pub fn remove(&self, id: &str) -> Option<AlarmRecord> {
        let mut alarms = lock(&self.alarms);
        let index = alarms.iter().position(|a| a.id == id)?;
        Some(alarms.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<AlarmRecord> {
        lock(&self.alarms).iter().find(|a| a.id == id).cloned()
    }

    /// Simulate a storage outage: every call fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("memory repository offline".into()))
        } else {
            Ok(())
        }
    }
}

impl AlarmRepository for MemoryAlarmRepository {
    fn list(&self) -> Result<Vec<AlarmRecord>, RepositoryError> {
        self.check_online()?;
        Ok(lock(&self.alarms).clone())
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<AlarmRecord>, RepositoryError> {
        self.check_online()?;
        let mut alarms = lock(&self.alarms);
        Ok(alarms.iter_mut().find(|a| a.id == id).map(|alarm| {
            alarm.enabled = enabled;
            alarm.clone()
        }))
    }
}
