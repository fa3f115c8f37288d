//! Ring Buffer Store (C1).
//!
//! Per sensor, holds the most recent `R = sample_rate_hz * waveform_seconds`
//! samples in a fixed 3×R array of 32-bit floats (g). Writes are
//! append-only with wrap; reads extract the newest `N <= R` samples in
//! chronological order.
//!
//! Single-writer (the ingest task) / single-reader (the processor task) per
//! sensor; the reader always copies before computing (spec §5).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::types::{Axes, SensorId};

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("malformed block: expected 3 axes, channel count mismatch")]
    MalformedBlock,
}

/// A fixed-capacity, wrap-around tri-axial sample buffer for one sensor.
struct SensorRing {
    capacity: usize,
    data: Vec<Axes>,
    /// Index the next write will land on.
    write_pos: usize,
    /// Number of valid samples written so far, capped at `capacity`.
    len: usize,
    last_write: Instant,
    malformed_block_count: u64,
}

impl SensorRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: vec![Axes { x: 0.0, y: 0.0, z: 0.0 }; capacity],
            write_pos: 0,
            len: 0,
            last_write: Instant::now(),
            malformed_block_count: 0,
        }
    }

    fn ingest(&mut self, block: &[Axes]) {
        for sample in block {
            self.data[self.write_pos] = *sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            self.len = (self.len + 1).min(self.capacity);
        }
        self.last_write = Instant::now();
    }

    /// Newest `n` samples in chronological order, copied out.
    fn latest(&self, n: usize) -> Vec<Axes> {
        let n = n.min(self.len);
        let mut out = Vec::with_capacity(n);
        // `write_pos` is one past the most recent sample.
        let start = (self.write_pos + self.capacity - n) % self.capacity;
        for i in 0..n {
            out.push(self.data[(start + i) % self.capacity]);
        }
        out
    }

    fn age(&self) -> std::time::Duration {
        self.last_write.elapsed()
    }
}

/// Per-sensor ring buffer store.
pub struct RingBufferStore {
    capacity: usize,
    buffers: RwLock<HashMap<SensorId, SensorRing>>,
}

impl RingBufferStore {
    /// `capacity = sample_rate_hz * waveform_seconds`, rounded down.
    pub fn new(sample_rate_hz: f64, waveform_seconds: f64) -> Self {
        let capacity = ((sample_rate_hz * waveform_seconds).floor() as usize).max(1);
        Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Atomic with respect to concurrent reads from the same sensor (the
    /// `RwLock` write guard excludes readers for the duration of the copy).
    /// A malformed block (empty) is dropped silently with a counter
    /// increment; no partial write occurs.
    pub fn ingest(&self, sensor_id: SensorId, block: &[Axes]) -> Result<(), BufferError> {
        if block.is_empty() {
            let mut guard = self.buffers.write().expect("ring buffer lock poisoned");
            let entry = guard.entry(sensor_id).or_insert_with(|| SensorRing::new(self.capacity));
            entry.malformed_block_count += 1;
            return Err(BufferError::MalformedBlock);
        }
        let mut guard = self.buffers.write().expect("ring buffer lock poisoned");
        let entry = guard.entry(sensor_id).or_insert_with(|| SensorRing::new(self.capacity));
        entry.ingest(block);
        Ok(())
    }

    /// A contiguous snapshot (copied) of the newest `n` samples, chronological.
    pub fn latest(&self, sensor_id: SensorId, n: usize) -> Option<Vec<Axes>> {
        let guard = self.buffers.read().expect("ring buffer lock poisoned");
        guard.get(&sensor_id).map(|ring| ring.latest(n))
    }

    pub fn sample_count(&self, sensor_id: SensorId) -> usize {
        let guard = self.buffers.read().expect("ring buffer lock poisoned");
        guard.get(&sensor_id).map(|r| r.len).unwrap_or(0)
    }

    /// Whether the sensor has written within `max_age_s`.
    pub fn is_fresh(&self, sensor_id: SensorId, max_age_s: f64) -> bool {
        let guard = self.buffers.read().expect("ring buffer lock poisoned");
        guard
            .get(&sensor_id)
            .map(|r| r.age().as_secs_f64() <= max_age_s)
            .unwrap_or(false)
    }

    /// Subset of `ids` with a write within `max_age_s`.
    pub fn clients_with_recent_data(&self, ids: &[SensorId], max_age_s: f64) -> Vec<SensorId> {
        ids.iter().copied().filter(|id| self.is_fresh(*id, max_age_s)).collect()
    }

    /// Drop buffers whose sensor is no longer active.
    pub fn evict(&self, keep_set: &std::collections::HashSet<SensorId>) {
        let mut guard = self.buffers.write().expect("ring buffer lock poisoned");
        guard.retain(|id, _| keep_set.contains(id));
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u8) -> SensorId {
        SensorId([0, 0, 0, 0, 0, n])
    }

    fn axes(v: f32) -> Axes {
        Axes { x: v, y: v, z: v }
    }

    #[test]
    fn latest_returns_chronological_order_after_wrap() {
        let store = RingBufferStore::new(4.0, 1.0); // capacity 4
        let id = sid(1);
        for i in 0..6 {
            store.ingest(id, &[axes(i as f32)]).unwrap();
        }
        // capacity 4, wrote 0..6, newest 4 are 2,3,4,5
        let latest = store.latest(id, 4).unwrap();
        let vals: Vec<f32> = latest.iter().map(|a| a.x).collect();
        assert_eq!(vals, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn latest_caps_at_available_length() {
        let store = RingBufferStore::new(100.0, 1.0); // capacity 100
        let id = sid(2);
        store.ingest(id, &[axes(1.0), axes(2.0)]).unwrap();
        let latest = store.latest(id, 50).unwrap();
        assert_eq!(latest.len(), 2);
    }

    #[test]
    fn malformed_block_is_dropped_without_partial_write() {
        let store = RingBufferStore::new(10.0, 1.0);
        let id = sid(3);
        store.ingest(id, &[axes(1.0)]).unwrap();
        assert!(store.ingest(id, &[]).is_err());
        assert_eq!(store.sample_count(id), 1);
    }

    #[test]
    fn evict_drops_inactive_sensors() {
        let store = RingBufferStore::new(10.0, 1.0);
        let a = sid(1);
        let b = sid(2);
        store.ingest(a, &[axes(1.0)]).unwrap();
        store.ingest(b, &[axes(1.0)]).unwrap();
        let keep: std::collections::HashSet<_> = [a].into_iter().collect();
        store.evict(&keep);
        assert_eq!(store.sample_count(a), 1);
        assert_eq!(store.sample_count(b), 0);
    }

    #[test]
    fn freshness_reflects_recent_write() {
        let store = RingBufferStore::new(10.0, 1.0);
        let id = sid(1);
        store.ingest(id, &[axes(1.0)]).unwrap();
        assert!(store.is_fresh(id, 2.0));
    }
}
