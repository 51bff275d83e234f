pub mod linalg;
pub mod units;

pub use linalg::*;
pub use units::*;

use serde::{Deserialize, Serialize};

/// One inertial sample (~50 Hz).
///
/// `accel` is device-frame linear acceleration in g with gravity already
/// removed; `gyro` is angular rate in rad/s. Timestamps are monotonic
/// seconds shared with [`PositionFix`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InertialFrame {
    pub timestamp: f64,
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

impl InertialFrame {
    pub fn new(timestamp: f64, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self { timestamp, accel, gyro }
    }

    pub fn acceleration(&self) -> Vec3 {
        Vec3::from(self.accel)
    }

    pub fn angular_rate(&self) -> Vec3 {
        Vec3::from(self.gyro)
    }

    /// Acceleration magnitude in g.
    pub fn accel_magnitude(&self) -> f64 {
        self.acceleration().norm()
    }

    pub fn rotation_magnitude(&self) -> f64 {
        self.angular_rate().norm()
    }
}

/// Latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One satellite positioning fix (~1 Hz).
///
/// Negative `velocity`, `horizontal_accuracy` or `course` mean the source
/// could not provide that value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: f64,
    /// Doppler speed, m/s.
    pub velocity: f64,
    /// Horizontal accuracy radius, m.
    pub horizontal_accuracy: f64,
    /// Course over ground, degrees.
    #[serde(default = "invalid_course")]
    pub course: f64,
    pub latitude: f64,
    pub longitude: f64,
}

fn invalid_course() -> f64 {
    -1.0
}

impl PositionFix {
    pub fn new(
        timestamp: f64,
        velocity: f64,
        horizontal_accuracy: f64,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            timestamp,
            velocity,
            horizontal_accuracy,
            course: invalid_course(),
            latitude,
            longitude,
        }
    }

    pub fn with_course(mut self, course: f64) -> Self {
        self.course = course;
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn course(&self) -> Option<f64> {
        (self.course.is_finite() && self.course >= 0.0).then_some(self.course)
    }
}

/// Filtered output of one estimator tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    /// m/s, never negative.
    pub speed: f64,
    /// m since the last reset, never decreasing.
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_magnitudes() {
        let frame = InertialFrame::new(0.0, [0.3, 0.4, 0.0], [0.0, 0.6, 0.8]);
        assert!((frame.accel_magnitude() - 0.5).abs() < 1e-12);
        assert!((frame.rotation_magnitude() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_course_sentinel() {
        let fix = PositionFix::new(1.0, 5.0, 4.0, 32.2, -110.9);
        assert_eq!(fix.course(), None);
        assert_eq!(fix.with_course(90.0).course(), Some(90.0));
    }

    #[test]
    fn test_fix_deserializes_without_course() {
        let json = r#"{"timestamp":1.0,"velocity":3.0,"horizontal_accuracy":5.0,"latitude":10.0,"longitude":20.0}"#;
        let fix: PositionFix = serde_json::from_str(json).unwrap();
        assert_eq!(fix.course(), None);
        assert_eq!(fix.coordinate(), Coordinate::new(10.0, 20.0));
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(45.0, 7.0).is_valid());
        assert!(!Coordinate::new(95.0, 7.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 7.0).is_valid());
    }
}
