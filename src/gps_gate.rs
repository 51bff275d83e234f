//! Pre-filter for positioning fixes.
//!
//! A fix reaches the estimator only as a scalar Doppler speed, and only
//! after passing every rule below in order. The first failing rule wins.

use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;
use crate::types::PositionFix;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Accuracy radius negative, non-finite or above the gate.
    Accuracy,
    /// Velocity negative or non-finite.
    InvalidVelocity,
    /// Fix admitted too long after it was taken.
    Stale,
    /// Large speed step with no acceleration to explain it.
    ImplausibleJump,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GateDecision {
    Accept(f64),
    Reject(RejectReason),
}

impl GateDecision {
    pub fn accepted_speed(self) -> Option<f64> {
        match self {
            GateDecision::Accept(speed) => Some(speed),
            GateDecision::Reject(_) => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, GateDecision::Accept(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GpsGate {
    max_accuracy: f64,
    noise_floor: f64,
    max_fix_age: f64,
    jump_threshold: f64,
    jump_accel_floor: f64,
    max_jump_rejects: u32,
    jump_rejects: u32,
}

impl GpsGate {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            max_accuracy: config.gps_max_accuracy,
            noise_floor: config.gps_noise_floor,
            max_fix_age: config.gps_max_fix_age,
            jump_threshold: config.gps_jump_threshold,
            jump_accel_floor: config.gps_jump_accel_floor,
            max_jump_rejects: config.gps_jump_max_rejects,
            jump_rejects: 0,
        }
    }

    pub fn accuracy_ok(&self, horizontal_accuracy: f64) -> bool {
        horizontal_accuracy.is_finite() && (0.0..self.max_accuracy).contains(&horizontal_accuracy)
    }

    pub fn max_fix_age(&self) -> f64 {
        self.max_fix_age
    }

    /// Decide whether `fix` may update the filter.
    ///
    /// `now` is the latest processing timestamp. `anchored_speed` is the
    /// filter's current speed when it is anchored by a recent fix, `None`
    /// when cold (the jump rule needs a trustworthy reference).
    /// `accel_g` is the most recent acceleration magnitude.
    pub fn evaluate(
        &mut self,
        fix: &PositionFix,
        now: f64,
        anchored_speed: Option<f64>,
        accel_g: f64,
    ) -> GateDecision {
        if !self.accuracy_ok(fix.horizontal_accuracy) {
            return GateDecision::Reject(RejectReason::Accuracy);
        }

        if !fix.velocity.is_finite() || fix.velocity < 0.0 {
            return GateDecision::Reject(RejectReason::InvalidVelocity);
        }
        let speed = if fix.velocity < self.noise_floor { 0.0 } else { fix.velocity };

        if !fix.timestamp.is_finite() || now - fix.timestamp > self.max_fix_age {
            return GateDecision::Reject(RejectReason::Stale);
        }

        if let Some(reference) = anchored_speed {
            let jump = (speed - reference).abs();
            if jump > self.jump_threshold && accel_g < self.jump_accel_floor {
                if self.jump_rejects < self.max_jump_rejects {
                    self.jump_rejects += 1;
                    return GateDecision::Reject(RejectReason::ImplausibleJump);
                }
                log::debug!(
                    "Accepting {:.2} m/s after {} consecutive jump rejections",
                    speed,
                    self.jump_rejects
                );
            }
        }

        self.jump_rejects = 0;
        GateDecision::Accept(speed)
    }

    pub fn jump_rejects(&self) -> u32 {
        self.jump_rejects
    }

    pub fn reset(&mut self) {
        self.jump_rejects = 0;
    }
}
