//! Top-level error kinds the analysis pipeline distinguishes (spec §7).
//!
//! Component modules own narrower `thiserror` enums for their own failure
//! modes (`processing::ProcessingError`, `storage::StorageError`, ...); this
//! type is the worker-boundary error the post-analysis pipeline composes
//! them into. The pipeline never lets an `Err` of this type escape the
//! worker — every variant below either becomes a `REF_*` finding, a
//! `run.status = error`, or a `run_suitability` entry before the boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Speed coverage below threshold, tire size unknown, engine RPM
    /// reference unavailable, or sample rate missing.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// Fewer than the minimum match points for every hypothesis, or zero
    /// samples.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Malformed JSON or a persisted sample failing schema validation.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// NaN/Inf leaked into an output field.
    #[error("non-finite metric in field {field}")]
    NonFiniteMetric { field: &'static str },

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Processing(#[from] crate::processing::ProcessingError),
}

/// `processing_state` reported by the health endpoint (spec §7 `FatalProcessing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingHealth {
    Ok,
    Degraded,
    Fatal,
}

/// Tracks consecutive processing-tick failures and derives `ProcessingHealth`
/// per spec §7: `FatalProcessing` after `FATAL_PROCESSING_TICK_FAILURES` in a
/// row, backing off for `FATAL_PROCESSING_BACKOFF_S` before resetting.
#[derive(Debug, Default)]
pub struct TickFailureTracker {
    consecutive_failures: u32,
    backing_off_until: Option<std::time::Instant>,
}

impl TickFailureTracker {
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.backing_off_until = None;
    }

    pub fn record_failure(&mut self) -> ProcessingHealth {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= crate::config::defaults::FATAL_PROCESSING_TICK_FAILURES {
            self.backing_off_until = Some(
                std::time::Instant::now()
                    + std::time::Duration::from_secs(crate::config::defaults::FATAL_PROCESSING_BACKOFF_S),
            );
            self.consecutive_failures = 0;
            return ProcessingHealth::Fatal;
        }
        ProcessingHealth::Degraded
    }

    pub fn health(&self) -> ProcessingHealth {
        if self.backing_off_until.map(|t| t > std::time::Instant::now()).unwrap_or(false) {
            ProcessingHealth::Fatal
        } else if self.consecutive_failures > 0 {
            ProcessingHealth::Degraded
        } else {
            ProcessingHealth::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_escalates_after_threshold() {
        let mut tracker = TickFailureTracker::default();
        let mut last = ProcessingHealth::Ok;
        for _ in 0..crate::config::defaults::FATAL_PROCESSING_TICK_FAILURES {
            last = tracker.record_failure();
        }
        assert_eq!(last, ProcessingHealth::Fatal);
    }

    #[test]
    fn tracker_resets_on_success() {
        let mut tracker = TickFailureTracker::default();
        tracker.record_failure();
        tracker.record_success();
        assert_eq!(tracker.health(), ProcessingHealth::Ok);
    }
}
