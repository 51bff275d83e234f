//! Tunable constants and session configuration.
//!
//! The noise and threshold defaults were tuned against phone-grade sensors
//! and are expected to be re-tuned against recorded logs (see the replay
//! binary). Only the structure of the filter depends on them, not the values.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{axis_from_components, Axis3, Coordinate, SpeedUnit};

// ─── Estimator ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    // ── Filter noise ──
    /// (m/s²)². How much the filter trusts inertial prediction vs GPS.
    pub process_noise_variance: f64,
    /// (m/s)². How much the filter trusts GPS Doppler speed.
    pub gps_measurement_variance: f64,
    pub initial_variance: f64,
    pub stationary_variance: f64,

    // ── Acceleration gating ──
    /// g. Minimum acceleration treated as genuine motion.
    pub accel_threshold: f64,
    pub accel_debounce_frames: u32,
    /// rad/s. Above this the device is being shaken, not driven.
    pub shake_rotation_limit: f64,
    pub integration_gain: f64,
    /// Device-frame direction of travel. `None` uses acceleration magnitude.
    pub forward_axis: Option<[f64; 3]>,

    // ── Drift and clamping ──
    /// Per-step decay applied while un-anchored and idle.
    pub drift_decay: f64,
    pub drift_reference_rate_hz: f64,
    pub zero_snap_speed: f64,
    pub max_speed: f64,

    // ── Stationary detection ──
    pub stationary_accel_threshold: f64,
    pub stationary_rotation_threshold: f64,
    pub stationary_gps_speed: f64,
    pub stationary_debounce_frames: u32,

    // ── GPS gating ──
    pub gps_anchor_hold_secs: f64,
    pub gps_max_accuracy: f64,
    pub gps_noise_floor: f64,
    pub gps_max_fix_age: f64,
    pub gps_jump_threshold: f64,
    pub gps_jump_accel_floor: f64,
    pub gps_jump_max_rejects: u32,

    // ── Signal health ──
    pub fix_timeout_secs: f64,
    pub inertial_timeout_secs: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            process_noise_variance: 25.0,
            gps_measurement_variance: 1.0,
            initial_variance: 4.0,
            stationary_variance: 0.01,
            accel_threshold: 0.06,
            accel_debounce_frames: 2,
            shake_rotation_limit: 2.5,
            integration_gain: 0.7,
            forward_axis: None,
            drift_decay: 0.97,
            drift_reference_rate_hz: 50.0,
            zero_snap_speed: 0.1,
            max_speed: 90.0,
            stationary_accel_threshold: 0.03,
            stationary_rotation_threshold: 0.05,
            stationary_gps_speed: 0.2,
            stationary_debounce_frames: 15,
            gps_anchor_hold_secs: 2.0,
            gps_max_accuracy: 15.0,
            gps_noise_floor: 0.2,
            gps_max_fix_age: 2.0,
            gps_jump_threshold: 3.0,
            gps_jump_accel_floor: 0.05,
            gps_jump_max_rejects: 3,
            fix_timeout_secs: 3.0,
            inertial_timeout_secs: 0.5,
        }
    }
}

impl EstimatorConfig {
    /// Vehicle tuning (the default).
    pub fn vehicle() -> Self {
        Self::default()
    }

    /// Walking/indoor tuning: low speed ceiling and a tighter accuracy gate.
    pub fn pedestrian() -> Self {
        Self {
            max_speed: 25.0,
            gps_max_accuracy: 10.0,
            integration_gain: 0.3,
            drift_decay: 0.95,
            ..Self::default()
        }
    }

    pub fn forward_axis(&self) -> Option<Axis3> {
        self.forward_axis.and_then(axis_from_components)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("process_noise_variance", self.process_noise_variance)?;
        positive("gps_measurement_variance", self.gps_measurement_variance)?;
        positive("initial_variance", self.initial_variance)?;
        non_negative("stationary_variance", self.stationary_variance)?;
        non_negative("accel_threshold", self.accel_threshold)?;
        count("accel_debounce_frames", self.accel_debounce_frames)?;
        positive("shake_rotation_limit", self.shake_rotation_limit)?;
        if !(self.integration_gain > 0.0 && self.integration_gain <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "integration_gain",
                value: self.integration_gain,
            });
        }
        if let Some(axis) = self.forward_axis {
            if axis_from_components(axis).is_none() {
                return Err(ConfigError::InvalidParameter {
                    name: "forward_axis",
                    value: axis[0].hypot(axis[1]).hypot(axis[2]),
                });
            }
        }
        if !(self.drift_decay > 0.0 && self.drift_decay <= 1.0) {
            return Err(ConfigError::InvalidParameter { name: "drift_decay", value: self.drift_decay });
        }
        positive("drift_reference_rate_hz", self.drift_reference_rate_hz)?;
        non_negative("zero_snap_speed", self.zero_snap_speed)?;
        positive("max_speed", self.max_speed)?;
        non_negative("stationary_accel_threshold", self.stationary_accel_threshold)?;
        non_negative("stationary_rotation_threshold", self.stationary_rotation_threshold)?;
        non_negative("stationary_gps_speed", self.stationary_gps_speed)?;
        count("stationary_debounce_frames", self.stationary_debounce_frames)?;
        positive("gps_anchor_hold_secs", self.gps_anchor_hold_secs)?;
        positive("gps_max_accuracy", self.gps_max_accuracy)?;
        non_negative("gps_noise_floor", self.gps_noise_floor)?;
        positive("gps_max_fix_age", self.gps_max_fix_age)?;
        positive("gps_jump_threshold", self.gps_jump_threshold)?;
        non_negative("gps_jump_accel_floor", self.gps_jump_accel_floor)?;
        positive("fix_timeout_secs", self.fix_timeout_secs)?;
        positive("inertial_timeout_secs", self.inertial_timeout_secs)?;
        Ok(())
    }

    /// Load a (possibly partial) JSON config; missing fields keep defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::default().overlay_json_file(path)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::default().overlay_json_str(text)
    }

    /// Apply a (possibly partial) JSON config on top of `self`; fields the
    /// file does not name keep their current values.
    pub fn overlay_json_file(&self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = self.overlay_json_str(&text)?;
        log::info!("Loaded estimator config from {}", path.display());
        Ok(config)
    }

    pub fn overlay_json_str(&self, text: &str) -> Result<Self, ConfigError> {
        let parse_error = |e: serde_json::Error| ConfigError::Parse(e.to_string());
        let overrides: serde_json::Value = serde_json::from_str(text).map_err(parse_error)?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(ConfigError::Parse("estimator config must be a JSON object".to_string()));
        };
        let mut merged = serde_json::to_value(self).map_err(parse_error)?;
        if let serde_json::Value::Object(fields) = &mut merged {
            fields.extend(overrides);
        }
        let config: Self = serde_json::from_value(merged).map_err(parse_error)?;
        config.validate()?;
        if config.gps_max_accuracy > 50.0 {
            log::warn!(
                "gps_max_accuracy {:.1} m admits very coarse fixes",
                config.gps_max_accuracy
            );
        }
        Ok(config)
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

fn count(name: &'static str, value: u32) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value: 0.0 })
    }
}

// ─── Drag runs ───────────────────────────────────────────────────────────────

/// Where a drag run's distance comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSource {
    /// Great-circle distance from the launch coordinate.
    #[default]
    StartPoint,
    /// Filtered distance integrated since launch.
    Integrated,
}

/// ~1 mph.
pub const DEFAULT_LAUNCH_SPEED: f64 = 0.447;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    /// m/s.
    pub target_speed: Option<f64>,
    /// m.
    pub target_distance: Option<f64>,
    /// Gated GPS speed (m/s) that starts the clock.
    pub launch_speed: f64,
    pub distance_source: DistanceSource,
    pub display_unit: SpeedUnit,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            target_speed: None,
            target_distance: None,
            launch_speed: DEFAULT_LAUNCH_SPEED,
            distance_source: DistanceSource::default(),
            display_unit: SpeedUnit::default(),
        }
    }
}

impl DragConfig {
    pub fn to_speed(target_speed: f64) -> Self {
        Self { target_speed: Some(target_speed), ..Self::default() }
    }

    pub fn to_distance(target_distance: f64) -> Self {
        Self { target_distance: Some(target_distance), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_speed.is_none() && self.target_distance.is_none() {
            return Err(ConfigError::MissingTarget);
        }
        if let Some(value) = self.target_speed {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidTarget { name: "target_speed", value });
            }
        }
        if let Some(value) = self.target_distance {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidTarget { name: "target_distance", value });
            }
        }
        positive("launch_speed", self.launch_speed)?;
        Ok(())
    }
}

// ─── Lap sessions ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub start_finish: Coordinate,
}

impl Track {
    pub fn new(name: impl Into<String>, start_finish: Coordinate) -> Self {
        Self { name: name.into(), start_finish }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapConfig {
    pub track: Option<Track>,
    /// m. Distance to the start/finish point that counts as a crossing.
    pub crossing_radius_m: f64,
    /// s. Crossings closer together than this are the same crossing.
    pub min_lap_interval_secs: f64,
}

impl Default for LapConfig {
    fn default() -> Self {
        Self { track: None, crossing_radius_m: 10.0, min_lap_interval_secs: 5.0 }
    }
}

impl LapConfig {
    pub fn for_track(track: Track) -> Self {
        Self { track: Some(track), ..Self::default() }
    }

    /// Returns the validated track.
    pub fn validate(&self) -> Result<&Track, ConfigError> {
        let track = self.track.as_ref().ok_or(ConfigError::MissingTrack)?;
        if !track.start_finish.is_valid() {
            return Err(ConfigError::InvalidTrack(format!(
                "start/finish ({}, {}) is not a valid coordinate",
                track.start_finish.latitude, track.start_finish.longitude
            )));
        }
        positive("crossing_radius_m", self.crossing_radius_m)?;
        non_negative("min_lap_interval_secs", self.min_lap_interval_secs)?;
        Ok(track)
    }
}
