pub mod speed_kalman;

pub use speed_kalman::{FilterState, GpsAnchor, SpeedEstimator};
