//! Zero-velocity detection.
//!
//! Consumer IMU noise never settles to exactly zero, so rest has to be
//! declared from sustained quiet input rather than observed directly.

use crate::config::EstimatorConfig;

#[derive(Clone, Debug, PartialEq)]
pub struct StationaryDetector {
    accel_threshold: f64,
    rotation_threshold: f64,
    gps_speed_threshold: f64,
    debounce_frames: u32,
    frames: u32,
}

impl StationaryDetector {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            accel_threshold: config.stationary_accel_threshold,
            rotation_threshold: config.stationary_rotation_threshold,
            gps_speed_threshold: config.stationary_gps_speed,
            debounce_frames: config.stationary_debounce_frames,
            frames: 0,
        }
    }

    /// Candidate test for a single frame, no debouncing.
    pub fn is_candidate(&self, accel_g: f64, rotation: f64, gps_speed: Option<f64>) -> bool {
        accel_g < self.accel_threshold
            && rotation < self.rotation_threshold
            && gps_speed.unwrap_or(0.0) < self.gps_speed_threshold
    }

    /// Feed one frame. Returns true once more than `debounce_frames`
    /// consecutive candidate frames have been seen.
    pub fn observe(&mut self, accel_g: f64, rotation: f64, gps_speed: Option<f64>) -> bool {
        if self.is_candidate(accel_g, rotation, gps_speed) {
            self.frames = self.frames.saturating_add(1);
        } else {
            self.frames = 0;
        }
        self.is_stationary()
    }

    pub fn is_stationary(&self) -> bool {
        self.frames > self.debounce_frames
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn reset(&mut self) {
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> StationaryDetector {
        StationaryDetector::new(&EstimatorConfig::default())
    }

    #[test]
    fn test_fires_after_debounce() {
        let mut d = detector();
        for _ in 0..15 {
            assert!(!d.observe(0.01, 0.01, None));
        }
        assert!(d.observe(0.01, 0.01, None));
        assert_eq!(d.frames(), 16);
    }

    #[test]
    fn test_counter_resets_on_motion() {
        let mut d = detector();
        for _ in 0..10 {
            d.observe(0.01, 0.01, Some(0.1));
        }
        assert!(!d.observe(0.2, 0.01, None));
        assert_eq!(d.frames(), 0);
    }

    #[test]
    fn test_gps_speed_blocks_rest() {
        let d = detector();
        assert!(d.is_candidate(0.0, 0.0, None));
        assert!(d.is_candidate(0.0, 0.0, Some(0.1)));
        assert!(!d.is_candidate(0.0, 0.0, Some(5.0)));
        assert!(!d.is_candidate(0.0, 0.06, None));
    }
}
