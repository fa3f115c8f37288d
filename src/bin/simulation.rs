//! Synthetic sensor stream generator.
//!
//! Emits newline-delimited `IngestEvent` JSON to stdout at a fixed block
//! rate — the same shape [`vibesensor::acquisition::StdinFrameSource`]
//! consumes — so the pipeline can be exercised end-to-end without real
//! hardware. Mirrors the wheel/engine/road vibration profiles used in the
//! scenario fixtures, translated into waveform synthesis rather than
//! pre-recorded fixtures.

use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use vibesensor::acquisition::IngestEvent;
use vibesensor::types::{Axes, SampleFrame, SensorId, VehicleTelemetry};

const DEFAULT_TIRE_CIRCUMFERENCE_M: f64 = 2.05;
const SENSOR_NAMES: [&str; 4] = ["front-left", "front-right", "rear-left", "rear-right"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Profile {
    EngineIdle,
    WheelImbalance,
    RoughRoad,
    RearBody,
}

impl std::str::FromStr for Profile {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "engine_idle" => Ok(Profile::EngineIdle),
            "wheel_imbalance" => Ok(Profile::WheelImbalance),
            "rough_road" => Ok(Profile::RoughRoad),
            "rear_body" => Ok(Profile::RearBody),
            other => Err(format!("unknown profile {other:?}")),
        }
    }
}

/// `name=profile`, e.g. `front-left=wheel_imbalance`.
#[derive(Clone, Debug)]
struct SensorAssignment {
    name: String,
    profile: Profile,
}

impl std::str::FromStr for SensorAssignment {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, profile) = s.split_once('=').ok_or_else(|| format!("expected NAME=PROFILE, got {s:?}"))?;
        Ok(SensorAssignment { name: name.to_string(), profile: profile.parse()? })
    }
}

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Synthetic accelerometer/telemetry stream for VibeSensor")]
struct Args {
    /// Run duration in seconds
    #[arg(long, default_value_t = 20.0)]
    duration_s: f64,

    /// Sample frame emission rate (Hz) — each block covers 1/frame_hz seconds of waveform
    #[arg(long, default_value_t = 4.0)]
    frame_hz: f64,

    /// Raw accelerometer sample rate within each block (Hz)
    #[arg(long, default_value_t = 800.0)]
    sample_rate_hz: f64,

    /// Constant vehicle speed for the whole run (km/h); omit for a stationary run
    #[arg(long)]
    speed_kmh: Option<f64>,

    /// `NAME=PROFILE` pairs; unlisted sensors default to engine_idle.
    /// Profiles: engine_idle, wheel_imbalance, rough_road, rear_body.
    #[arg(long = "sensor", value_name = "NAME=PROFILE")]
    sensors: Vec<SensorAssignment>,

    /// Skip the real-time delay between blocks and emit as fast as possible
    #[arg(long)]
    no_realtime: bool,
}

fn sensor_id_for(index: usize) -> SensorId {
    let mut bytes = [0u8; 6];
    bytes[5] = (index + 1) as u8;
    SensorId(bytes)
}

fn wheel_rotation_hz(speed_kmh: f64) -> f64 {
    let speed_m_s = speed_kmh / 3.6;
    speed_m_s / DEFAULT_TIRE_CIRCUMFERENCE_M
}

fn synth_axis(profile: Profile, t_s: f64, speed_kmh: f64, noise: f64, rng: &mut impl Rng) -> Axes {
    let tone = match profile {
        Profile::EngineIdle => 0.01 * (2.0 * std::f64::consts::PI * 25.0 * t_s).sin(),
        Profile::WheelImbalance => {
            let f = wheel_rotation_hz(speed_kmh).max(0.1);
            0.25 * (2.0 * std::f64::consts::PI * f * t_s).sin()
        }
        Profile::RoughRoad => 0.0,
        Profile::RearBody => 0.15 * (2.0 * std::f64::consts::PI * 38.0 * t_s).sin(),
    };
    let noise_scale = match profile {
        Profile::RoughRoad => 0.2,
        _ => 0.01,
    };
    Axes {
        x: (tone + noise * noise_scale) as f32,
        y: (tone * 0.6 + noise * noise_scale * rng.gen_range(0.8..1.2)) as f32,
        z: (1.0 + tone * 0.3 + noise * noise_scale) as f32,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut assignments = std::collections::HashMap::new();
    for a in &args.sensors {
        assignments.insert(a.name.clone(), a.profile);
    }

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let normal = Normal::new(0.0, 1.0).expect("unit normal is always valid");
    let mut rng = rand::thread_rng();

    let speed_kmh = args.speed_kmh.unwrap_or(0.0);
    if let Some(speed) = args.speed_kmh {
        let event = IngestEvent::Telemetry(VehicleTelemetry { speed_kmh: Some(speed), engine_rpm: Some(900.0 + speed * 25.0) });
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
    }

    let block_period = Duration::from_secs_f64(1.0 / args.frame_hz);
    let samples_per_block = (args.sample_rate_hz / args.frame_hz).round() as usize;
    let total_blocks = (args.duration_s * args.frame_hz).round() as u64;

    let mut elapsed_s = 0.0f64;
    let mut seqs = vec![0u32; SENSOR_NAMES.len()];

    for _ in 0..total_blocks {
        for (i, name) in SENSOR_NAMES.iter().enumerate() {
            let profile = assignments.get(*name).copied().unwrap_or(Profile::EngineIdle);
            let mut samples = Vec::with_capacity(samples_per_block);
            for k in 0..samples_per_block {
                let t_s = elapsed_s + k as f64 / args.sample_rate_hz;
                let noise = normal.sample(&mut rng);
                samples.push(synth_axis(profile, t_s, speed_kmh, noise, &mut rng));
            }
            let frame = SampleFrame {
                sensor_id: sensor_id_for(i),
                seq: seqs[i],
                t0_us: (elapsed_s * 1_000_000.0) as u64,
                samples,
            };
            seqs[i] = seqs[i].wrapping_add(1);
            let event = IngestEvent::Frame(frame);
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
        out.flush()?;
        elapsed_s += 1.0 / args.frame_hz;
        if !args.no_realtime {
            std::thread::sleep(block_period);
        }
    }

    Ok(())
}
