//! Run history storage.
//!
//! Persists `RunMetadata` and `ProcessedSample` records to sled for each
//! run. Metadata lives in a `run_metadata` tree keyed by run id; samples
//! for a run live in their own tree (`samples_<run_id>`) keyed by a
//! monotonic big-endian sequence number, which sorts chronologically.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::summary::RunSummary;
use crate::types::{ProcessedSample, RunMetadata};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("run not found: {0}")]
    RunNotFound(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

const RUN_METADATA_TREE: &str = "run_metadata";
const RUN_SUMMARY_TREE: &str = "run_summary";

fn samples_tree_name(run_id: &str) -> String {
    format!("samples_{run_id}")
}

/// Sled-backed store for runs and their sample records.
#[derive(Clone)]
pub struct HistoryStore {
    db: Arc<sled::Db>,
}

impl HistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Write (or overwrite) a run's metadata record.
    pub fn save_run_metadata(&self, metadata: &RunMetadata) -> Result<(), StorageError> {
        let tree = self.db.open_tree(RUN_METADATA_TREE)?;
        let value = serde_json::to_vec(metadata)?;
        tree.insert(metadata.run_id.as_bytes(), value)?;
        Ok(())
    }

    pub fn get_run_metadata(&self, run_id: &str) -> Result<Option<RunMetadata>, StorageError> {
        let tree = self.db.open_tree(RUN_METADATA_TREE)?;
        match tree.get(run_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All run metadata, newest `start_time_utc` first.
    pub fn list_runs(&self) -> Result<Vec<RunMetadata>, StorageError> {
        let tree = self.db.open_tree(RUN_METADATA_TREE)?;
        let mut runs: Vec<RunMetadata> = tree
            .iter()
            .filter_map(|item| item.ok().and_then(|(_, v)| serde_json::from_slice::<RunMetadata>(&v).ok()))
            .collect();
        runs.sort_by(|a, b| b.start_time_utc.cmp(&a.start_time_utc));
        Ok(runs)
    }

    /// Append one sample to a run, keyed by a monotonically increasing
    /// sequence number so iteration order is chronological.
    pub fn append_sample(&self, run_id: &str, sample: &ProcessedSample) -> Result<(), StorageError> {
        let tree = self.db.open_tree(samples_tree_name(run_id))?;
        let seq = tree.generate_id()?;
        let value = serde_json::to_vec(sample)?;
        tree.insert(seq.to_be_bytes(), value)?;
        Ok(())
    }

    /// All samples for a run, in chronological order.
    pub fn get_samples(&self, run_id: &str) -> Result<Vec<ProcessedSample>, StorageError> {
        let tree = self.db.open_tree(samples_tree_name(run_id))?;
        Ok(tree
            .iter()
            .filter_map(|item| item.ok().and_then(|(_, v)| serde_json::from_slice::<ProcessedSample>(&v).ok()))
            .collect())
    }

    pub fn sample_count(&self, run_id: &str) -> Result<usize, StorageError> {
        let tree = self.db.open_tree(samples_tree_name(run_id))?;
        Ok(tree.len())
    }

    /// Delete a run's metadata and all its sample records.
    pub fn delete_run(&self, run_id: &str) -> Result<(), StorageError> {
        let meta_tree = self.db.open_tree(RUN_METADATA_TREE)?;
        if meta_tree.remove(run_id.as_bytes())?.is_none() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }
        self.db.drop_tree(samples_tree_name(run_id))?;
        let summary_tree = self.db.open_tree(RUN_SUMMARY_TREE)?;
        summary_tree.remove(run_id.as_bytes())?;
        Ok(())
    }

    /// Write (or overwrite) a run's completed analysis summary (spec §F
    /// `GET /api/history/{id}/insights`).
    pub fn save_run_summary(&self, summary: &RunSummary) -> Result<(), StorageError> {
        let tree = self.db.open_tree(RUN_SUMMARY_TREE)?;
        let value = serde_json::to_vec(summary)?;
        tree.insert(summary.run_id.as_bytes(), value)?;
        Ok(())
    }

    /// The raw JSON bytes of a run's summary, if analysis has completed for
    /// it. Returned as bytes rather than a parsed `RunSummary` so the HTTP
    /// layer can pass them straight through as the response body.
    pub fn get_run_summary_json(&self, run_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let tree = self.db.open_tree(RUN_SUMMARY_TREE)?;
        Ok(tree.get(run_id.as_bytes())?.map(|bytes| bytes.to_vec()))
    }

    /// One JSON object per line: the run's metadata, then every sample in
    /// chronological order (spec §F `GET /api/history/{id}/export`).
    pub fn export_jsonl(&self, run_id: &str) -> Result<String, StorageError> {
        let metadata = self.get_run_metadata(run_id)?.ok_or_else(|| StorageError::RunNotFound(run_id.to_string()))?;
        let mut out = String::new();
        out.push_str(&serde_json::to_string(&metadata)?);
        out.push('\n');
        for sample in self.get_samples(run_id)? {
            out.push_str(&serde_json::to_string(&sample)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;

    fn sample(run_id: &str, t_s: f64) -> ProcessedSample {
        ProcessedSample::new(run_id, t_s, "aabbccddeeff", "Front Left")
    }

    #[test]
    fn store_and_retrieve_run_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        let meta = RunMetadata::new("run-1");
        store.save_run_metadata(&meta).unwrap();

        let fetched = store.get_run_metadata("run-1").unwrap().unwrap();
        assert_eq!(fetched.run_id, "run-1");
        assert_eq!(fetched.status, RunStatus::Recording);
    }

    #[test]
    fn samples_come_back_in_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        for t in [0.0, 0.25, 0.5, 0.75] {
            store.append_sample("run-1", &sample("run-1", t)).unwrap();
        }
        let samples = store.get_samples("run-1").unwrap();
        let ts: Vec<f64> = samples.iter().map(|s| s.t_s).collect();
        assert_eq!(ts, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn list_runs_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        let mut a = RunMetadata::new("a");
        let mut b = RunMetadata::new("b");
        a.start_time_utc = chrono::Utc::now() - chrono::Duration::seconds(10);
        b.start_time_utc = chrono::Utc::now();
        store.save_run_metadata(&a).unwrap();
        store.save_run_metadata(&b).unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs[0].run_id, "b");
        assert_eq!(runs[1].run_id, "a");
    }

    #[test]
    fn delete_run_removes_metadata_and_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.save_run_metadata(&RunMetadata::new("run-1")).unwrap();
        store.append_sample("run-1", &sample("run-1", 0.0)).unwrap();

        store.delete_run("run-1").unwrap();
        assert!(store.get_run_metadata("run-1").unwrap().is_none());
        assert_eq!(store.sample_count("run-1").unwrap(), 0);
    }

    #[test]
    fn delete_unknown_run_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        assert!(store.delete_run("nope").is_err());
    }

    #[test]
    fn export_jsonl_has_metadata_then_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.save_run_metadata(&RunMetadata::new("run-1")).unwrap();
        store.append_sample("run-1", &sample("run-1", 0.0)).unwrap();
        store.append_sample("run-1", &sample("run-1", 0.25)).unwrap();

        let jsonl = store.export_jsonl("run-1").unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("run_metadata"));
        assert!(lines[1].contains("\"sample\""));
    }
}
