//! Real-time speed and distance estimation for performance timing.
//!
//! Inertial frames (~50 Hz) and gated GPS Doppler speed (~1 Hz) are fused
//! by a scalar Kalman filter; drag and lap sessions time events on top of
//! the fused estimate.

pub mod config;
pub mod error;
pub mod filters;
pub mod geodesy;
pub mod gps_gate;
pub mod health_monitor;
pub mod live_status;
pub mod runner;
pub mod sessions;
pub mod stationary;
pub mod tracker;
pub mod types;

pub use config::{DistanceSource, DragConfig, EstimatorConfig, LapConfig, Track};
pub use error::{ConfigError, SpeedtrapError};
pub use filters::SpeedEstimator;
pub use gps_gate::{GateDecision, GpsGate, RejectReason};
pub use health_monitor::{FixStatus, SignalHealth};
pub use live_status::{LiveStatus, StatusBoard};
pub use sessions::{DragSession, FinishReason, LapRecord, LapSession, RunMetrics};
pub use stationary::StationaryDetector;
pub use tracker::SpeedTracker;
pub use types::{Coordinate, InertialFrame, PositionFix, SpeedEstimate, SpeedUnit};
