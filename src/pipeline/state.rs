//! Shared pipeline state: the live sensor data path (C1-C3) plus the
//! bookkeeping the HTTP layer needs to start/stop a logging run (spec §5).

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use tracing::warn;
use uuid::Uuid;

use crate::buffer::RingBufferStore;
use crate::config::defaults::ANALYSIS_QUEUE_CAPACITY;
use crate::error::{ProcessingHealth, TickFailureTracker};
use crate::live::LiveDiagnosticsEngine;
use crate::processing::FftProcessor;
use crate::registry::SensorRegistry;
use crate::storage::HistoryStore;
use crate::types::{ProcessedSample, RunMetadata, RunStatus, SensorId, TireSpec, VehicleTelemetry};

use super::PipelineError;

/// Parameters accepted by `POST /api/logging/start` (spec §F), forwarded
/// into the new run's metadata.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StartRunParams {
    pub tire: Option<TireSpec>,
    pub final_drive_ratio: Option<f64>,
    pub current_gear_ratio: Option<f64>,
}

struct ActiveRun {
    metadata: RunMetadata,
    samples: Vec<ProcessedSample>,
    started_at: Instant,
}

/// One run queued for post-stop analysis (spec §5's bounded worker queue).
pub struct AnalysisJob {
    pub metadata: RunMetadata,
    pub samples: Vec<ProcessedSample>,
    pub connected_locations: HashSet<String>,
}

/// Bounded FIFO of analysis jobs. When full, the oldest queued job is
/// dropped (logged) rather than blocking the caller that just stopped a run
/// (spec §5: "maxlen 100, oldest evicted with log on full").
pub struct AnalysisQueue {
    jobs: Mutex<std::collections::VecDeque<AnalysisJob>>,
    notify: tokio::sync::Notify,
}

impl Default for AnalysisQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(std::collections::VecDeque::with_capacity(ANALYSIS_QUEUE_CAPACITY)),
            notify: tokio::sync::Notify::new(),
        }
    }

    pub fn push(&self, job: AnalysisJob) {
        let mut guard = self.jobs.lock().expect("analysis queue lock poisoned");
        if guard.len() >= ANALYSIS_QUEUE_CAPACITY {
            if let Some(dropped) = guard.pop_front() {
                warn!(run_id = %dropped.metadata.run_id, capacity = ANALYSIS_QUEUE_CAPACITY, "analysis queue full, dropping oldest queued run");
            }
        }
        guard.push_back(job);
        drop(guard);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<AnalysisJob> {
        self.jobs.lock().expect("analysis queue lock poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("analysis queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Everything the ingest/processing/recorder/broadcast/analysis tasks share.
pub struct PipelineState {
    pub buffer: RingBufferStore,
    pub registry: SensorRegistry,
    pub history: HistoryStore,
    pub live: Mutex<LiveDiagnosticsEngine>,
    pub analysis_queue: AnalysisQueue,

    tick_failures: Mutex<TickFailureTracker>,
    processors: Mutex<HashMap<SensorId, FftProcessor>>,
    vehicle: RwLock<VehicleTelemetry>,
    latest_samples: RwLock<HashMap<SensorId, ProcessedSample>>,
    run: RwLock<Option<ActiveRun>>,
    started_at: Instant,
}

impl PipelineState {
    pub fn new(history: HistoryStore) -> Self {
        let cfg = crate::config::get();
        Self {
            buffer: RingBufferStore::new(cfg.sample_rate_hz, cfg.waveform_seconds),
            registry: SensorRegistry::new(),
            history,
            live: Mutex::new(LiveDiagnosticsEngine::new()),
            analysis_queue: AnalysisQueue::new(),
            tick_failures: Mutex::new(TickFailureTracker::default()),
            processors: Mutex::new(HashMap::new()),
            vehicle: RwLock::new(VehicleTelemetry::default()),
            latest_samples: RwLock::new(HashMap::new()),
            run: RwLock::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn set_vehicle_telemetry(&self, telemetry: VehicleTelemetry) {
        *self.vehicle.write().expect("vehicle telemetry lock poisoned") = telemetry;
    }

    pub fn is_recording(&self) -> bool {
        self.run.read().expect("run lock poisoned").is_some()
    }

    pub fn active_run_id(&self) -> Option<String> {
        self.run.read().expect("run lock poisoned").as_ref().map(|r| r.metadata.run_id.clone())
    }

    /// Begins a new recording run. Errors if one is already active (spec §F:
    /// the caller should 409).
    pub fn start_run(&self, params: StartRunParams) -> Result<RunMetadata, PipelineError> {
        let mut guard = self.run.write().expect("run lock poisoned");
        if guard.is_some() {
            return Err(PipelineError::AlreadyRecording);
        }
        let mut metadata = RunMetadata::new(Uuid::new_v4().to_string());
        metadata.raw_sample_rate_hz = crate::config::get().sample_rate_hz;
        metadata.fft_window_size = crate::config::get().fft_window_size;
        metadata.tire = params.tire;
        metadata.tire_circumference_m = params.tire.map(|t| t.circumference_m());
        metadata.final_drive_ratio = params.final_drive_ratio;
        metadata.current_gear_ratio = params.current_gear_ratio;

        self.history.save_run_metadata(&metadata)?;
        self.live.lock().expect("live engine lock poisoned").reset();
        let result = metadata.clone();
        *guard = Some(ActiveRun { metadata, samples: Vec::new(), started_at: Instant::now() });
        Ok(result)
    }

    /// Ends the active run, enqueues it for post-analysis, and returns its
    /// (now `Analyzing`) metadata. Errors if nothing is recording.
    pub fn stop_run(&self) -> Result<RunMetadata, PipelineError> {
        let mut guard = self.run.write().expect("run lock poisoned");
        let Some(mut active) = guard.take() else {
            return Err(PipelineError::NoActiveRun);
        };
        active.metadata.status = RunStatus::Analyzing;
        active.metadata.end_time_utc = Some(chrono::Utc::now());
        self.history.save_run_metadata(&active.metadata)?;

        let connected_locations: HashSet<String> =
            self.registry.snapshot().into_iter().filter_map(|e| e.location).collect();
        let result = active.metadata.clone();
        self.analysis_queue.push(AnalysisJob {
            metadata: active.metadata,
            samples: active.samples,
            connected_locations,
        });
        Ok(result)
    }

    fn current_t_s(&self) -> f64 {
        let guard = self.run.read().expect("run lock poisoned");
        match guard.as_ref() {
            Some(run) => run.started_at.elapsed().as_secs_f64(),
            None => self.started_at.elapsed().as_secs_f64(),
        }
    }

    /// One processing-task tick (spec §4.2): for every live sensor, pull its
    /// newest FFT window and extract strength metrics. Skips the whole tick
    /// while the failure tracker is in its fatal backoff window.
    pub fn run_processing_tick(&self) {
        if self.tick_failures.lock().expect("tick failure lock poisoned").health() == ProcessingHealth::Fatal {
            return;
        }
        let cfg = crate::config::get();
        let t_s = self.current_t_s();
        let (run_id, final_drive_ratio, current_gear_ratio) = {
            let guard = self.run.read().expect("run lock poisoned");
            match guard.as_ref() {
                Some(run) => (Some(run.metadata.run_id.clone()), run.metadata.final_drive_ratio, run.metadata.current_gear_ratio),
                None => (None, None, None),
            }
        };
        let telemetry = *self.vehicle.read().expect("vehicle telemetry lock poisoned");

        for entry in self.registry.active() {
            let window = match self.buffer.latest(entry.sensor_id, cfg.fft_window_size) {
                Some(w) => w,
                None => continue,
            };

            let mut processors = self.processors.lock().expect("fft processor cache lock poisoned");
            if !processors.contains_key(&entry.sensor_id) {
                match FftProcessor::new(cfg.fft_window_size, entry.sample_rate_hz) {
                    Ok(processor) => {
                        processors.insert(entry.sensor_id, processor);
                    }
                    Err(e) => {
                        warn!(sensor = %entry.sensor_id, error = %e, "could not build FFT processor for sensor");
                        continue;
                    }
                }
            }
            let processor = processors.get(&entry.sensor_id).expect("just inserted");

            match crate::processing::process_tick(processor, &window) {
                Ok(Some(metrics)) => {
                    self.tick_failures.lock().expect("tick failure lock poisoned").record_success();
                    let mut sample = ProcessedSample::new(
                        run_id.clone().unwrap_or_else(|| "live".to_string()),
                        t_s,
                        entry.sensor_id.to_string(),
                        entry.display_name.clone(),
                    );
                    sample.speed_kmh = telemetry.speed_kmh;
                    sample.engine_rpm = telemetry.engine_rpm;
                    sample.final_drive_ratio = final_drive_ratio;
                    sample.current_gear_ratio = current_gear_ratio;
                    sample.sample_rate_hz = entry.sample_rate_hz;
                    sample.accel_x_g = metrics.axis_rms.0;
                    sample.accel_y_g = metrics.axis_rms.1;
                    sample.accel_z_g = metrics.axis_rms.2;
                    sample.vibration_strength_db = metrics.strength.strength_db;
                    sample.strength_floor_amp_g = metrics.strength.strength_floor_amp_g;
                    sample.strength_bucket = metrics.strength.strength_bucket;
                    sample.top_peaks = metrics.strength.top_strength_peaks;
                    sample.dominant_freq_hz = metrics.dominant_freq_hz;

                    self.latest_samples.write().expect("latest samples lock poisoned").insert(entry.sensor_id, sample);
                }
                Ok(None) => {}
                Err(e) => {
                    let health = self.tick_failures.lock().expect("tick failure lock poisoned").record_failure();
                    warn!(sensor = %entry.sensor_id, error = %e, ?health, "processing tick failed");
                }
            }
        }
    }

    /// One recorder-task tick (spec §5): snapshots whatever the processing
    /// task has computed most recently per sensor into the active run, both
    /// in memory (for the end-of-run analysis job) and on disk.
    pub fn run_recorder_tick(&self) {
        let samples: Vec<ProcessedSample> =
            self.latest_samples.read().expect("latest samples lock poisoned").values().cloned().collect();
        if samples.is_empty() {
            return;
        }
        let mut guard = self.run.write().expect("run lock poisoned");
        let Some(run) = guard.as_mut() else {
            return;
        };
        for sample in samples {
            if let Err(e) = self.history.append_sample(&run.metadata.run_id, &sample) {
                warn!(run_id = %run.metadata.run_id, error = %e, "failed to persist sample");
                continue;
            }
            run.samples.push(sample);
        }
    }

    /// One broadcast-task tick (spec §5): feeds the live diagnostics engine
    /// (C11) with the latest per-sensor samples. Does nothing for the
    /// history/insights endpoints, which read persisted data instead — this
    /// only drives the live hysteresis state machine forward.
    pub fn run_live_tick(&self) {
        let samples: Vec<ProcessedSample> =
            self.latest_samples.read().expect("latest samples lock poisoned").values().cloned().collect();
        if samples.is_empty() {
            return;
        }
        let guard = self.run.read().expect("run lock poisoned");
        let owned_metadata;
        let metadata: &RunMetadata = match guard.as_ref() {
            Some(run) => &run.metadata,
            None => {
                owned_metadata = RunMetadata::new("live");
                &owned_metadata
            }
        };
        let tire_circumference_m = crate::summary::effective_tire_circumference_m(metadata);
        let now_s = self.current_t_s();
        let _snapshot = self
            .live
            .lock()
            .expect("live engine lock poisoned")
            .update(now_s, &samples, metadata, tire_circumference_m);
    }

    /// Drops ring-buffer/registry state for sensors that have gone silent
    /// past `CLIENT_TTL_SECONDS` (spec §4.3).
    pub fn evict_stale_sensors(&self) {
        let stale = self.registry.evict_stale();
        if stale.is_empty() {
            return;
        }
        let keep: HashSet<SensorId> = self.registry.snapshot().into_iter().map(|e| e.sensor_id).collect();
        self.buffer.evict(&keep);
        let mut processors = self.processors.lock().expect("fft processor cache lock poisoned");
        for id in stale {
            processors.remove(&id);
        }
    }
}
