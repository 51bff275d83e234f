//! One-dimensional forward-speed Kalman filter.
//!
//! Inertial frames drive the prediction at ~50 Hz, GPS Doppler speed
//! corrects it at ~1 Hz. Between fixes the estimate dead-reckons on
//! debounced acceleration; when nothing anchors it the speed bleeds off,
//! and when the platform is confirmed at rest it is forced to exactly zero.
//!
//! State: `[speed]` with scalar variance `P`.
//!
//! ```text
//! predict:  v⁻ = v + u·dt          P⁻ = P + q·dt²
//! update:   K  = P⁻ / (P⁻ + r)     v  = v⁻ + K·(z − v⁻)     P = (1 − K)·P⁻
//! ```

use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;
use crate::stationary::StationaryDetector;
use crate::types::{is_finite_vec, Axis3, InertialFrame, SpeedEstimate, Vec3, STANDARD_GRAVITY};

/// Most recent accepted GPS speed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsAnchor {
    pub speed: f64,
    pub timestamp: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// m/s
    pub speed: f64,
    /// m
    pub distance: f64,
    /// (m/s)²
    pub variance: f64,
    pub last_timestamp: Option<f64>,
    pub high_accel_frames: u32,
    pub stationary_frames: u32,
    pub last_gps: Option<GpsAnchor>,
}

pub struct SpeedEstimator {
    config: EstimatorConfig,
    forward_axis: Option<Axis3>,
    state: FilterState,
    stationary: StationaryDetector,
    control_active: bool,
}

impl SpeedEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            forward_axis: config.forward_axis(),
            stationary: StationaryDetector::new(&config),
            state: FilterState::default(),
            control_active: false,
            config,
        }
    }

    /// Zero speed, distance, variance and every counter. The next sample
    /// bootstraps the filter again.
    pub fn reset(&mut self) {
        self.state = FilterState::default();
        self.stationary.reset();
        self.control_active = false;
    }

    pub fn process_frame(&mut self, frame: &InertialFrame, gps_speed: Option<f64>) -> SpeedEstimate {
        self.process_sample(frame.timestamp, gps_speed, frame.acceleration(), frame.angular_rate())
    }

    /// Advance the filter by one inertial tick.
    ///
    /// `gps_speed` is an already gated Doppler speed, attached only on the
    /// tick where a fresh fix is available.
    pub fn process_sample(
        &mut self,
        timestamp: f64,
        gps_speed: Option<f64>,
        accel: Vec3,
        angular_rate: Vec3,
    ) -> SpeedEstimate {
        if !timestamp.is_finite() || !is_finite_vec(&accel) || !is_finite_vec(&angular_rate) {
            log::debug!("Dropping non-finite inertial sample at t={}", timestamp);
            return self.estimate();
        }
        let gps_speed = gps_speed.filter(|v| v.is_finite() && *v >= 0.0);

        let Some(last_timestamp) = self.state.last_timestamp else {
            self.bootstrap(timestamp, gps_speed);
            return self.estimate();
        };

        let dt = timestamp - last_timestamp;
        if dt <= 0.0 {
            return self.estimate();
        }

        if let Some(speed) = gps_speed {
            self.state.last_gps = Some(GpsAnchor { speed, timestamp });
        }
        let anchor = self.fresh_anchor(timestamp);

        // Zero-velocity update
        let rotation = angular_rate.norm();
        let at_rest = self.stationary.observe(accel.norm(), rotation, anchor.map(|a| a.speed));
        self.state.stationary_frames = self.stationary.frames();
        if at_rest {
            self.state.speed = 0.0;
            self.state.variance = self.config.stationary_variance;
            self.state.high_accel_frames = 0;
            self.state.last_timestamp = Some(timestamp);
            self.control_active = false;
            return self.estimate();
        }

        let control = self.control_acceleration(&accel, rotation);
        self.control_active = control.is_some();

        // Predict
        let mut speed = self.state.speed + control.unwrap_or(0.0) * dt;
        let mut variance = self.state.variance + self.config.process_noise_variance * dt * dt;

        // Update
        if let Some(measured) = gps_speed {
            let innovation = measured - speed;
            let innovation_variance = variance + self.config.gps_measurement_variance;
            let gain = variance / innovation_variance;
            speed += gain * innovation;
            variance *= 1.0 - gain;
        } else if control.is_none() && anchor.is_none() {
            speed *= self.config.drift_decay.powf(dt * self.config.drift_reference_rate_hz);
        }

        self.state.speed = self.clamp_speed(speed, control.is_some());
        self.state.variance = if variance.is_finite() && variance >= 0.0 {
            variance
        } else {
            self.config.initial_variance
        };

        self.state.distance += self.state.speed * dt;
        self.state.last_timestamp = Some(timestamp);
        self.estimate()
    }

    fn bootstrap(&mut self, timestamp: f64, gps_speed: Option<f64>) {
        self.state.last_timestamp = Some(timestamp);
        match gps_speed {
            Some(speed) => {
                self.state.speed = self.clamp_speed(speed, false);
                self.state.variance = self.config.gps_measurement_variance;
                self.state.last_gps = Some(GpsAnchor { speed, timestamp });
            }
            None => self.state.variance = self.config.initial_variance,
        }
    }

    /// Debounced driving acceleration in m/s², or `None` when this frame
    /// should not drive the prediction.
    fn control_acceleration(&mut self, accel: &Vec3, rotation: f64) -> Option<f64> {
        let (magnitude, sign) = match self.forward_axis {
            Some(axis) => {
                let along = accel.dot(&axis.into_inner());
                (along.abs(), along.signum())
            }
            None => (accel.norm(), 1.0),
        };

        if magnitude <= self.config.accel_threshold {
            self.state.high_accel_frames = 0;
            return None;
        }
        self.state.high_accel_frames = self.state.high_accel_frames.saturating_add(1);

        if self.state.high_accel_frames < self.config.accel_debounce_frames
            || rotation >= self.config.shake_rotation_limit
        {
            return None;
        }

        let excess = magnitude - self.config.accel_threshold;
        Some(sign * excess * STANDARD_GRAVITY * self.config.integration_gain)
    }

    fn clamp_speed(&self, speed: f64, driving: bool) -> f64 {
        if !speed.is_finite() {
            return 0.0;
        }
        if !driving && speed < self.config.zero_snap_speed {
            return 0.0;
        }
        speed.clamp(0.0, self.config.max_speed)
    }

    fn fresh_anchor(&self, now: f64) -> Option<GpsAnchor> {
        self.state
            .last_gps
            .filter(|a| now - a.timestamp <= self.config.gps_anchor_hold_secs)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn estimate(&self) -> SpeedEstimate {
        SpeedEstimate { speed: self.state.speed, distance: self.state.distance }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn speed(&self) -> f64 {
        self.state.speed
    }

    pub fn distance(&self) -> f64 {
        self.state.distance
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary.is_stationary()
    }

    /// True if an accepted GPS speed is recent enough to anchor the filter.
    pub fn is_anchored(&self, now: f64) -> bool {
        self.fresh_anchor(now).is_some()
    }

    /// Whether the last processed tick had a qualifying control input.
    pub fn control_active(&self) -> bool {
        self.control_active
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
}
