//! Persistent Storage (C4 support).
//!
//! Runs and their per-sample records live in a single `sled` database:
//! one `run_metadata` per run plus a per-run tree of `ProcessedSample`
//! records keyed by monotonically increasing sequence number (sorts
//! chronologically for free). JSONL export concatenates metadata +
//! samples in that same order.

pub mod history;

pub use history::{HistoryStore, StorageError};
