//! Sensor Registry (C3).
//!
//! Tracks every sensor that has ever said hello: its assigned location
//! (e.g. `front_left`), display name, advertised sample rate, and
//! liveness. Entries age out after `CLIENT_TTL_SECONDS` of silence.
//! Registry edits (rename, location assignment) are persisted to disk
//! through the storage layer, but no more often than
//! `REGISTRY_PERSIST_MIN_INTERVAL_S` unless the caller forces it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SensorId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown sensor: {0}")]
    UnknownSensor(SensorId),
}

/// One sensor's registration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEntry {
    pub sensor_id: SensorId,
    pub location: Option<String>,
    pub display_name: String,
    pub sample_rate_hz: f64,
    #[serde(skip, default = "Instant::now")]
    pub last_seen: Instant,
}

impl SensorEntry {
    fn new(sensor_id: SensorId, sample_rate_hz: f64) -> Self {
        Self {
            display_name: sensor_id.to_string(),
            sensor_id,
            location: None,
            sample_rate_hz,
            last_seen: Instant::now(),
        }
    }
}

/// Live sensor bookkeeping. One instance shared across the ingest and API
/// layers behind an `Arc`.
pub struct SensorRegistry {
    entries: RwLock<HashMap<SensorId, SensorEntry>>,
    last_persist: RwLock<Option<Instant>>,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_persist: RwLock::new(None),
        }
    }

    /// Record a hello/data message from `sensor_id`, creating the entry on
    /// first contact. Always refreshes `last_seen`.
    pub fn observe(&self, sensor_id: SensorId, sample_rate_hz: f64) {
        let mut guard = self.entries.write().expect("registry lock poisoned");
        let entry = guard
            .entry(sensor_id)
            .or_insert_with(|| SensorEntry::new(sensor_id, sample_rate_hz));
        entry.sample_rate_hz = sample_rate_hz;
        entry.last_seen = Instant::now();
    }

    pub fn set_location(&self, sensor_id: SensorId, location: impl Into<String>) -> Result<(), RegistryError> {
        let mut guard = self.entries.write().expect("registry lock poisoned");
        let entry = guard.get_mut(&sensor_id).ok_or(RegistryError::UnknownSensor(sensor_id))?;
        entry.location = Some(location.into());
        Ok(())
    }

    pub fn rename(&self, sensor_id: SensorId, display_name: impl Into<String>) -> Result<(), RegistryError> {
        let mut guard = self.entries.write().expect("registry lock poisoned");
        let entry = guard.get_mut(&sensor_id).ok_or(RegistryError::UnknownSensor(sensor_id))?;
        entry.display_name = display_name.into();
        Ok(())
    }

    pub fn get(&self, sensor_id: SensorId) -> Option<SensorEntry> {
        let guard = self.entries.read().expect("registry lock poisoned");
        guard.get(&sensor_id).cloned()
    }

    /// All sensors that have produced data within `CLIENT_TTL_SECONDS`.
    pub fn active(&self) -> Vec<SensorEntry> {
        let ttl = Duration::from_secs(crate::config::defaults::CLIENT_TTL_SECONDS);
        let guard = self.entries.read().expect("registry lock poisoned");
        guard
            .values()
            .filter(|e| e.last_seen.elapsed() <= ttl)
            .cloned()
            .collect()
    }

    /// Drop entries silent for longer than `CLIENT_TTL_SECONDS`. Returns the
    /// evicted sensor ids so the ring buffer store can be swept in step.
    pub fn evict_stale(&self) -> Vec<SensorId> {
        let ttl = Duration::from_secs(crate::config::defaults::CLIENT_TTL_SECONDS);
        let mut guard = self.entries.write().expect("registry lock poisoned");
        let stale: Vec<SensorId> = guard
            .values()
            .filter(|e| e.last_seen.elapsed() > ttl)
            .map(|e| e.sensor_id)
            .collect();
        for id in &stale {
            guard.remove(id);
        }
        stale
    }

    /// Whether a persisted snapshot is due: either none has ever been taken,
    /// `force` is set, or `REGISTRY_PERSIST_MIN_INTERVAL_S` has elapsed since
    /// the last one. Callers persisting a snapshot must call
    /// [`Self::mark_persisted`] afterwards.
    pub fn persist_due(&self, force: bool) -> bool {
        if force {
            return true;
        }
        let min_interval = Duration::from_secs(crate::config::defaults::REGISTRY_PERSIST_MIN_INTERVAL_S);
        let guard = self.last_persist.read().expect("registry lock poisoned");
        match *guard {
            None => true,
            Some(last) => last.elapsed() >= min_interval,
        }
    }

    pub fn mark_persisted(&self) {
        let mut guard = self.last_persist.write().expect("registry lock poisoned");
        *guard = Some(Instant::now());
    }

    pub fn snapshot(&self) -> Vec<SensorEntry> {
        let guard = self.entries.read().expect("registry lock poisoned");
        guard.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u8) -> SensorId {
        SensorId([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn observe_creates_then_refreshes_entry() {
        let reg = SensorRegistry::new();
        reg.observe(sid(1), 800.0);
        reg.observe(sid(1), 400.0);
        let e = reg.get(sid(1)).unwrap();
        assert_eq!(e.sample_rate_hz, 400.0);
    }

    #[test]
    fn set_location_on_unknown_sensor_errors() {
        let reg = SensorRegistry::new();
        assert!(reg.set_location(sid(9), "front_left").is_err());
    }

    #[test]
    fn rename_updates_display_name() {
        let reg = SensorRegistry::new();
        reg.observe(sid(2), 800.0);
        reg.rename(sid(2), "Front Left").unwrap();
        assert_eq!(reg.get(sid(2)).unwrap().display_name, "Front Left");
    }

    #[test]
    fn persist_due_is_true_until_marked() {
        let reg = SensorRegistry::new();
        assert!(reg.persist_due(false));
        reg.mark_persisted();
        assert!(!reg.persist_due(false));
        assert!(reg.persist_due(true));
    }

    #[test]
    fn active_excludes_nothing_when_fresh() {
        let reg = SensorRegistry::new();
        reg.observe(sid(3), 800.0);
        assert_eq!(reg.active().len(), 1);
    }
}
