use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use flate2::read::GzDecoder;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use speedtrap_rs::config::{DistanceSource, DragConfig, EstimatorConfig, LapConfig, Track};
use speedtrap_rs::runner::{self, SessionHandle, DEFAULT_QUEUE_CAPACITY};
use speedtrap_rs::types::{Coordinate, InertialFrame, PositionFix, SpeedUnit};

#[derive(Parser, Debug)]
#[command(name = "speedtrap")]
#[command(about = "Replay recorded sensor logs through a drag or lap session", long_about = None)]
struct Args {
    /// Path to a recorded log (.json or .json.gz)
    #[arg(long)]
    log: PathBuf,

    /// Estimator config JSON; fields not given keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use walking/indoor tuning instead of vehicle tuning
    #[arg(long)]
    pedestrian: bool,

    /// Drag distance from integrated speed instead of distance to the launch point
    #[arg(long)]
    integrated_distance: bool,

    /// Unit for --target-speed and reported peak speed
    #[arg(long, value_enum, default_value = "mps")]
    unit: UnitArg,

    /// Write the final live status snapshot here
    #[arg(long)]
    status_file: Option<String>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Time a run from launch to a target speed or distance
    Drag {
        /// Target speed, in --unit
        #[arg(long)]
        target_speed: Option<f64>,

        /// Target distance, metres
        #[arg(long)]
        target_distance: Option<f64>,
    },
    /// Time laps across a start/finish point
    Lap {
        #[arg(long)]
        track_lat: f64,

        #[arg(long)]
        track_lon: f64,

        #[arg(long, default_value = "track")]
        track_name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UnitArg {
    Mps,
    Kmh,
    Mph,
}

impl From<UnitArg> for SpeedUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Mps => SpeedUnit::MetersPerSecond,
            UnitArg::Kmh => SpeedUnit::KilometersPerHour,
            UnitArg::Mph => SpeedUnit::MilesPerHour,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct SensorReading {
    timestamp: f64,
    #[serde(default)]
    inertial: Option<InertialFrame>,
    #[serde(default)]
    fix: Option<PositionFix>,
}

#[derive(Serialize, Deserialize, Debug)]
struct LogFile {
    readings: Vec<SensorReading>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let estimator = load_estimator_config(&args)?;
    let mut log_file = load_log(&args.log)
        .with_context(|| format!("failed to read log {}", args.log.display()))?;
    log_file.readings.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    info!("Loaded {} readings from {}", log_file.readings.len(), args.log.display());

    let unit = SpeedUnit::from(args.unit);
    match &args.mode {
        Mode::Drag { target_speed, target_distance } => {
            let config = DragConfig {
                target_speed: target_speed.map(|v| unit.to_mps(v)),
                target_distance: *target_distance,
                distance_source: if args.integrated_distance {
                    DistanceSource::Integrated
                } else {
                    DistanceSource::StartPoint
                },
                display_unit: unit,
                ..DragConfig::default()
            };
            let handle = runner::spawn_drag(config, estimator, DEFAULT_QUEUE_CAPACITY)?;
            let board = handle.status_board().clone();
            replay(&handle, &log_file.readings).await;

            match handle.finish().await? {
                Some(metrics) => {
                    info!(
                        "Run: {:.3}s over {:.1} m, peak {:.2} {}",
                        metrics.elapsed_time,
                        metrics.distance_traveled,
                        metrics.peak_speed_display(),
                        metrics.display_unit.as_str()
                    );
                    println!("{}", serde_json::to_string_pretty(&metrics)?);
                }
                None => warn!("Log ended before the run launched"),
            }
            save_status(&args, &board.latest())?;
        }
        Mode::Lap { track_lat, track_lon, track_name } => {
            let start_finish = Coordinate::new(*track_lat, *track_lon);
            let config = LapConfig::for_track(Track::new(track_name.clone(), start_finish));
            let handle = runner::spawn_lap(config, estimator, DEFAULT_QUEUE_CAPACITY)?;
            let board = handle.status_board().clone();
            replay(&handle, &log_file.readings).await;

            match handle.finish().await? {
                Some(record) => {
                    info!("{} laps, best {:?}", record.lap_durations.len(), record.best_lap);
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => bail!("lap session produced no record"),
            }
            save_status(&args, &board.latest())?;
        }
    }

    Ok(())
}

/// The preset is chosen first; a config file only overrides the fields it names.
fn load_estimator_config(args: &Args) -> Result<EstimatorConfig> {
    let preset = if args.pedestrian {
        EstimatorConfig::pedestrian()
    } else {
        EstimatorConfig::vehicle()
    };
    match &args.config {
        Some(path) => Ok(preset.overlay_json_file(path)?),
        None => Ok(preset),
    }
}

fn load_log(path: &Path) -> Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Push readings through the session in timestamp order. A fix is sent
/// ahead of the frame sharing its reading so it lands on that tick.
async fn replay<R>(handle: &SessionHandle<R>, readings: &[SensorReading]) {
    for (i, reading) in readings.iter().enumerate() {
        if let Some(fix) = reading.fix {
            if handle.send_position(fix).await.is_err() {
                info!("Session closed after {} readings", i);
                return;
            }
        }
        if let Some(frame) = reading.inertial {
            if handle.send_inertial(frame).await.is_err() {
                info!("Session closed after {} readings", i);
                return;
            }
        }
        if i > 0 && i % 1000 == 0 {
            let status = handle.latest();
            info!(
                "[{:.1}s] {} | {:.2} m/s | {:.1} m | GPS {}",
                status.timestamp,
                status.phase,
                status.speed,
                status.distance,
                status.fix_status.as_str()
            );
        }
    }
}

fn save_status(args: &Args, status: &speedtrap_rs::LiveStatus) -> Result<()> {
    if let Some(path) = &args.status_file {
        status
            .save(path)
            .with_context(|| format!("failed to write status to {}", path))?;
    }
    Ok(())
}
