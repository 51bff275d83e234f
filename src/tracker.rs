//! Per-session sample plumbing: gate, estimator and signal health behind
//! one pair of entry points, one per input stream.

use crate::config::EstimatorConfig;
use crate::filters::{GpsAnchor, SpeedEstimator};
use crate::gps_gate::{GateDecision, GpsGate};
use crate::health_monitor::{FixStatus, SignalHealth};
use crate::types::{InertialFrame, PositionFix, SpeedEstimate};

pub struct SpeedTracker {
    estimator: SpeedEstimator,
    gate: GpsGate,
    health: SignalHealth,
    /// Accepted speed waiting for the next inertial tick.
    pending_gps: Option<GpsAnchor>,
    last_accel_g: f64,
    last_timestamp: Option<f64>,
}

impl SpeedTracker {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            gate: GpsGate::new(&config),
            health: SignalHealth::new(&config),
            estimator: SpeedEstimator::new(config),
            pending_gps: None,
            last_accel_g: 0.0,
            last_timestamp: None,
        }
    }

    /// Gate a positioning fix. An accepted speed is held until the next
    /// inertial frame, where it drives the filter update.
    pub fn on_position(&mut self, fix: &PositionFix) -> GateDecision {
        let now = self.last_timestamp.unwrap_or(fix.timestamp);
        let anchored_speed = self.estimator.is_anchored(now).then(|| self.estimator.speed());
        let decision = self.gate.evaluate(fix, now, anchored_speed, self.last_accel_g);

        match decision {
            GateDecision::Accept(speed) => {
                let newer = self.pending_gps.map_or(true, |p| fix.timestamp >= p.timestamp);
                if newer {
                    self.pending_gps = Some(GpsAnchor { speed, timestamp: fix.timestamp });
                }
                self.health.record_fix(fix.timestamp, true);
            }
            GateDecision::Reject(reason) => {
                log::debug!(
                    "Rejected fix t={:.2} v={:.2} acc={:.1}: {:?}",
                    fix.timestamp,
                    fix.velocity,
                    fix.horizontal_accuracy,
                    reason
                );
                self.health.record_fix(fix.timestamp, false);
            }
        }
        decision
    }

    /// Advance the estimator by one inertial frame.
    pub fn on_inertial(&mut self, frame: &InertialFrame) -> SpeedEstimate {
        let finite = frame.timestamp.is_finite()
            && frame.accel.iter().chain(frame.gyro.iter()).all(|v| v.is_finite());
        if !finite {
            log::debug!("Dropping non-finite inertial frame");
            return self.estimator.estimate();
        }
        if self.last_timestamp.is_some_and(|last| frame.timestamp <= last) {
            return self.estimator.estimate();
        }

        let max_age = self.gate.max_fix_age();
        let gps_speed = self
            .pending_gps
            .take()
            .filter(|p| frame.timestamp - p.timestamp <= max_age)
            .map(|p| p.speed);

        self.last_accel_g = frame.accel_magnitude();
        self.last_timestamp = Some(frame.timestamp);
        self.health.record_frame(frame.timestamp);

        self.estimator.process_frame(frame, gps_speed)
    }

    /// Reset the estimator and gate. Stream timing and health are kept.
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.gate.reset();
        self.pending_gps = None;
    }

    pub fn estimate(&self) -> SpeedEstimate {
        self.estimator.estimate()
    }

    pub fn estimator(&self) -> &SpeedEstimator {
        &self.estimator
    }

    pub fn gate(&self) -> &GpsGate {
        &self.gate
    }

    pub fn health(&self) -> &SignalHealth {
        &self.health
    }

    pub fn is_stationary(&self) -> bool {
        self.estimator.is_stationary()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn fix_status(&self) -> FixStatus {
        self.last_timestamp
            .map_or(FixStatus::NoFix, |now| self.health.fix_status(now))
    }
}
