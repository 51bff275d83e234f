//! Drag run timer: launch on GPS-confirmed motion, finish on target speed
//! or target distance.

use serde::{Deserialize, Serialize};

use crate::config::{DistanceSource, DragConfig, EstimatorConfig};
use crate::error::ConfigError;
use crate::geodesy;
use crate::health_monitor::FixStatus;
use crate::live_status::LiveStatus;
use crate::tracker::SpeedTracker;
use crate::types::{Coordinate, InertialFrame, PositionFix, SpeedEstimate, SpeedUnit};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragPhase {
    Idle,
    Armed,
    Running,
    Finished,
}

impl DragPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            DragPhase::Idle => "idle",
            DragPhase::Armed => "armed",
            DragPhase::Running => "running",
            DragPhase::Finished => "finished",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    TargetSpeed,
    TargetDistance,
    ManualStop,
}

/// Finalized drag run. Speeds in m/s, distances in m, times in s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub session_id: String,
    pub recorded_at: String,
    pub launch_timestamp: f64,
    pub elapsed_time: f64,
    pub distance_traveled: f64,
    pub peak_speed: f64,
    pub target_speed: Option<f64>,
    pub target_distance: Option<f64>,
    pub finish_reason: FinishReason,
    pub display_unit: SpeedUnit,
}

impl RunMetrics {
    pub fn peak_speed_display(&self) -> f64 {
        self.display_unit.from_mps(self.peak_speed)
    }
}

struct Launch {
    timestamp: f64,
    /// First usable coordinate at or after launch.
    location: Option<Coordinate>,
    /// Estimator distance at launch, for integrated runs.
    distance_offset: f64,
}

pub struct DragSession {
    id: String,
    config: DragConfig,
    tracker: SpeedTracker,
    phase: DragPhase,
    launch: Option<Launch>,
    elapsed: f64,
    distance: f64,
    peak_speed: f64,
    metrics: Option<RunMetrics>,
}

impl DragSession {
    /// Validate both configs and arm a fresh session.
    pub fn new(config: DragConfig, estimator: EstimatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        estimator.validate()?;

        let mut session = Self {
            id: super::new_session_id("drag"),
            config,
            tracker: SpeedTracker::new(estimator),
            phase: DragPhase::Idle,
            launch: None,
            elapsed: 0.0,
            distance: 0.0,
            peak_speed: 0.0,
            metrics: None,
        };
        session.arm();
        Ok(session)
    }

    fn arm(&mut self) {
        self.tracker.reset();
        self.phase = DragPhase::Armed;
        log::info!(
            "Drag session {} armed (target speed {:?} m/s, target distance {:?} m)",
            self.id,
            self.config.target_speed,
            self.config.target_distance
        );
    }

    /// Feed one positioning fix. Returns the metrics on the call that
    /// finishes the run.
    pub fn on_position(&mut self, fix: &PositionFix) -> Option<RunMetrics> {
        if self.phase == DragPhase::Finished {
            return None;
        }
        let gps_speed = self.tracker.on_position(fix).accepted_speed();

        if self.phase == DragPhase::Armed {
            match gps_speed {
                Some(speed) if speed >= self.config.launch_speed => self.start(fix),
                _ => return None,
            }
        }

        let accuracy_ok = self.tracker.gate().accuracy_ok(fix.horizontal_accuracy);
        if let Some(launch) = &mut self.launch {
            self.elapsed = self.elapsed.max(fix.timestamp - launch.timestamp);
            let coordinate = fix.coordinate();
            if self.config.distance_source == DistanceSource::StartPoint && accuracy_ok && coordinate.is_valid() {
                let origin = *launch.location.get_or_insert(coordinate);
                self.distance = geodesy::distance_m(origin, coordinate);
            }
        }
        self.check_targets(gps_speed, fix.timestamp)
    }

    /// Feed one inertial frame. Returns the metrics on the call that
    /// finishes the run.
    pub fn on_inertial(&mut self, frame: &InertialFrame) -> Option<RunMetrics> {
        if self.phase == DragPhase::Finished {
            return None;
        }
        let estimate = self.tracker.on_inertial(frame);

        match self.phase {
            DragPhase::Armed => {
                // keep pre-launch drift from accumulating while parked
                if self.tracker.is_stationary() && estimate.distance > 0.0 {
                    log::debug!("Stationary while armed, resetting estimator");
                    self.tracker.reset();
                }
                None
            }
            DragPhase::Running => {
                let Some(launch) = &self.launch else {
                    return None;
                };
                self.elapsed = self.elapsed.max(frame.timestamp - launch.timestamp);
                self.peak_speed = self.peak_speed.max(estimate.speed);
                if self.config.distance_source == DistanceSource::Integrated {
                    self.distance = (estimate.distance - launch.distance_offset).max(0.0);
                }
                self.check_targets(None, frame.timestamp)
            }
            DragPhase::Idle | DragPhase::Finished => None,
        }
    }

    /// Manual stop. Finalizes partial metrics if running; an armed run
    /// that never launched finishes with nothing to record.
    pub fn stop(&mut self) -> Option<RunMetrics> {
        match self.phase {
            DragPhase::Running => self.finish(FinishReason::ManualStop, None),
            DragPhase::Idle | DragPhase::Armed => {
                log::info!("Drag session {} stopped before launch", self.id);
                self.phase = DragPhase::Finished;
                None
            }
            DragPhase::Finished => None,
        }
    }

    fn start(&mut self, fix: &PositionFix) {
        let coordinate = fix.coordinate();
        self.launch = Some(Launch {
            timestamp: fix.timestamp,
            location: coordinate.is_valid().then_some(coordinate),
            distance_offset: self.tracker.estimate().distance,
        });
        self.phase = DragPhase::Running;
        self.elapsed = 0.0;
        self.distance = 0.0;
        self.peak_speed = self.tracker.estimate().speed;
        log::info!(
            "Drag session {} launched at t={:.2} ({:.2} m/s)",
            self.id,
            fix.timestamp,
            fix.velocity
        );
    }

    /// `timestamp` is the sample being processed; a run that finishes on it
    /// is timed to it.
    fn check_targets(&mut self, gps_speed: Option<f64>, timestamp: f64) -> Option<RunMetrics> {
        if self.phase != DragPhase::Running {
            return None;
        }
        let speed_reached = matches!(
            (self.config.target_speed, gps_speed),
            (Some(target), Some(speed)) if speed >= target
        );
        if speed_reached {
            return self.finish(FinishReason::TargetSpeed, Some(timestamp));
        }
        let distance_reached = self.config.target_distance.is_some_and(|target| self.distance >= target);
        if distance_reached {
            return self.finish(FinishReason::TargetDistance, Some(timestamp));
        }
        None
    }

    /// Target finishes pass the triggering sample's timestamp. Fixes and
    /// frames run on separate clocks, so the running `elapsed` may already
    /// be ahead of it.
    fn finish(&mut self, reason: FinishReason, at: Option<f64>) -> Option<RunMetrics> {
        if self.phase == DragPhase::Finished {
            return None;
        }
        self.phase = DragPhase::Finished;
        if let (Some(at), Some(launch)) = (at, &self.launch) {
            self.elapsed = (at - launch.timestamp).max(0.0);
        }

        let metrics = RunMetrics {
            session_id: self.id.clone(),
            recorded_at: super::recorded_at(),
            launch_timestamp: self.launch.as_ref().map_or(0.0, |l| l.timestamp),
            elapsed_time: self.elapsed,
            distance_traveled: self.distance,
            peak_speed: self.peak_speed,
            target_speed: self.config.target_speed,
            target_distance: self.config.target_distance,
            finish_reason: reason,
            display_unit: self.config.display_unit,
        };
        log::info!(
            "Drag session {} finished ({:?}): {:.3}s, {:.1} m, peak {:.2} {}",
            self.id,
            reason,
            metrics.elapsed_time,
            metrics.distance_traveled,
            metrics.peak_speed_display(),
            metrics.display_unit.as_str()
        );
        self.metrics = Some(metrics.clone());
        Some(metrics)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == DragPhase::Finished
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn peak_speed(&self) -> f64 {
        self.peak_speed
    }

    pub fn estimate(&self) -> SpeedEstimate {
        self.tracker.estimate()
    }

    pub fn metrics(&self) -> Option<&RunMetrics> {
        self.metrics.as_ref()
    }

    pub fn tracker(&self) -> &SpeedTracker {
        &self.tracker
    }

    pub fn status(&self) -> LiveStatus {
        let estimate = self.tracker.estimate();
        LiveStatus {
            timestamp: self.tracker.last_timestamp().unwrap_or_default(),
            phase: self.phase.as_str().to_string(),
            speed: estimate.speed,
            distance: self.distance,
            stationary: self.tracker.is_stationary(),
            fix_status: self.tracker.fix_status(),
            elapsed: self.elapsed,
            peak_speed: self.peak_speed,
            ..LiveStatus::default()
        }
    }

    pub fn fix_status(&self) -> FixStatus {
        self.tracker.fix_status()
    }
}
