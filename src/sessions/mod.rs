//! Event timers that consume estimator output.
//!
//! Each session owns its own [`SpeedTracker`](crate::tracker::SpeedTracker);
//! sessions never share filter state.

pub mod drag;
pub mod lap;

pub use drag::{DragPhase, DragSession, FinishReason, RunMetrics};
pub use lap::{predict_next_lap, AccelSample, LapEvent, LapPhase, LapRecord, LapSession, SpeedSample};

use chrono::Utc;

pub(crate) fn new_session_id(kind: &str) -> String {
    format!("{}_{}", kind, Utc::now().timestamp_millis())
}

pub(crate) fn recorded_at() -> String {
    Utc::now().to_rfc3339()
}
