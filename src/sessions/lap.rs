//! Lap timer driven by proximity to a single start/finish point.
//!
//! The first crossing starts the clock; each later crossing more than the
//! re-trigger interval after the previous one completes a lap.

use serde::{Deserialize, Serialize};

use crate::config::{EstimatorConfig, LapConfig, Track};
use crate::error::ConfigError;
use crate::geodesy;
use crate::live_status::LiveStatus;
use crate::tracker::SpeedTracker;
use crate::types::{Coordinate, InertialFrame, PositionFix, SpeedEstimate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapPhase {
    WaitingForFirstCross,
    Timing,
    Finished,
}

impl LapPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LapPhase::WaitingForFirstCross => "waiting_for_first_cross",
            LapPhase::Timing => "timing",
            LapPhase::Finished => "finished",
        }
    }
}

/// Emitted on a genuine start/finish crossing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LapEvent {
    ClockStarted { timestamp: f64 },
    LapCompleted { lap: usize, duration: f64, new_best: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub timestamp: f64,
    /// m/s
    pub speed: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub timestamp: f64,
    /// g
    pub magnitude: f64,
}

/// Finalized lap session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub session_id: String,
    pub recorded_at: String,
    pub track_name: String,
    /// Completion order, seconds.
    pub lap_durations: Vec<f64>,
    pub predicted_next_lap: f64,
    pub best_lap: Option<f64>,
    pub route: Vec<Coordinate>,
    pub speed_log: Vec<SpeedSample>,
    pub accel_log: Vec<AccelSample>,
}

/// Predicted time for the lap in progress: the historical average scaled by
/// how the current lap is pacing against the last completed one.
pub fn predict_next_lap(lap_durations: &[f64], in_progress: f64) -> f64 {
    let Some(&last) = lap_durations.last() else {
        return 0.0;
    };
    let average = lap_durations.iter().sum::<f64>() / lap_durations.len() as f64;
    if in_progress <= 0.0 || last <= 0.0 {
        return average;
    }
    average * (in_progress / last)
}

pub struct LapSession {
    id: String,
    track: Track,
    crossing_radius_m: f64,
    min_lap_interval_secs: f64,
    tracker: SpeedTracker,
    phase: LapPhase,
    last_cross_time: Option<f64>,
    lap_durations: Vec<f64>,
    current_lap_time: f64,
    predicted_next_lap: f64,
    route: Vec<Coordinate>,
    speed_log: Vec<SpeedSample>,
    accel_log: Vec<AccelSample>,
}

impl LapSession {
    pub fn new(config: LapConfig, estimator: EstimatorConfig) -> Result<Self, ConfigError> {
        let track = config.validate()?.clone();
        estimator.validate()?;

        let id = super::new_session_id("lap");
        log::info!(
            "Lap session {} waiting for first crossing at {} ({:.6}, {:.6})",
            id,
            track.name,
            track.start_finish.latitude,
            track.start_finish.longitude
        );
        Ok(Self {
            id,
            track,
            crossing_radius_m: config.crossing_radius_m,
            min_lap_interval_secs: config.min_lap_interval_secs,
            tracker: SpeedTracker::new(estimator),
            phase: LapPhase::WaitingForFirstCross,
            last_cross_time: None,
            lap_durations: Vec::new(),
            current_lap_time: 0.0,
            predicted_next_lap: 0.0,
            route: Vec::new(),
            speed_log: Vec::new(),
            accel_log: Vec::new(),
        })
    }

    /// Feed one positioning fix. Returns an event when it counts as a
    /// start/finish crossing.
    pub fn on_position(&mut self, fix: &PositionFix) -> Option<LapEvent> {
        if self.phase == LapPhase::Finished {
            return None;
        }
        self.tracker.on_position(fix);

        let coordinate = fix.coordinate();
        let usable = coordinate.is_valid() && self.tracker.gate().accuracy_ok(fix.horizontal_accuracy);
        if !usable {
            return None;
        }

        let event = self.detect_crossing(fix.timestamp, coordinate);
        if self.phase == LapPhase::Timing {
            self.route.push(coordinate);
            self.update_progress(fix.timestamp);
        }
        event
    }

    fn detect_crossing(&mut self, timestamp: f64, coordinate: Coordinate) -> Option<LapEvent> {
        let distance = geodesy::distance_m(coordinate, self.track.start_finish);
        if distance >= self.crossing_radius_m {
            return None;
        }

        match self.last_cross_time {
            None => {
                self.last_cross_time = Some(timestamp);
                self.phase = LapPhase::Timing;
                log::info!("Lap session {} clock started at t={:.2}", self.id, timestamp);
                Some(LapEvent::ClockStarted { timestamp })
            }
            Some(last) if timestamp - last > self.min_lap_interval_secs => {
                let duration = timestamp - last;
                let new_best = self.best_lap().map_or(true, |best| duration < best);
                self.lap_durations.push(duration);
                self.last_cross_time = Some(timestamp);
                let lap = self.lap_durations.len();
                log::info!(
                    "Lap {} completed in {:.3}s{}",
                    lap,
                    duration,
                    if new_best { " (best)" } else { "" }
                );
                Some(LapEvent::LapCompleted { lap, duration, new_best })
            }
            // still lingering near the line
            Some(_) => None,
        }
    }

    pub fn on_inertial(&mut self, frame: &InertialFrame) -> SpeedEstimate {
        if self.phase == LapPhase::Finished {
            return self.tracker.estimate();
        }
        let before = self.tracker.last_timestamp();
        let mut estimate = self.tracker.on_inertial(frame);
        let advanced = self.tracker.last_timestamp() != before;

        // bound dead-reckoning drift while parked
        if self.tracker.is_stationary() && estimate.distance > 0.0 {
            log::debug!("Lap session {} stationary, resetting estimator", self.id);
            self.tracker.reset();
            estimate = self.tracker.estimate();
        }

        if self.phase == LapPhase::Timing && advanced {
            self.speed_log.push(SpeedSample { timestamp: frame.timestamp, speed: estimate.speed });
            self.accel_log.push(AccelSample {
                timestamp: frame.timestamp,
                magnitude: frame.accel_magnitude(),
            });
            self.update_progress(frame.timestamp);
        }
        estimate
    }

    fn update_progress(&mut self, now: f64) {
        if let Some(last) = self.last_cross_time {
            self.current_lap_time = (now - last).max(0.0);
        }
        self.predicted_next_lap = predict_next_lap(&self.lap_durations, self.current_lap_time);
    }

    /// End the session. Returns the record once; later calls return `None`.
    pub fn finish(&mut self) -> Option<LapRecord> {
        if self.phase == LapPhase::Finished {
            return None;
        }
        self.phase = LapPhase::Finished;

        let record = LapRecord {
            session_id: self.id.clone(),
            recorded_at: super::recorded_at(),
            track_name: self.track.name.clone(),
            lap_durations: self.lap_durations.clone(),
            predicted_next_lap: self.predicted_next_lap,
            best_lap: self.best_lap(),
            route: std::mem::take(&mut self.route),
            speed_log: std::mem::take(&mut self.speed_log),
            accel_log: std::mem::take(&mut self.accel_log),
        };
        log::info!(
            "Lap session {} finished: {} laps, best {:?}",
            self.id,
            record.lap_durations.len(),
            record.best_lap
        );
        Some(record)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> LapPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == LapPhase::Finished
    }

    pub fn lap_durations(&self) -> &[f64] {
        &self.lap_durations
    }

    pub fn completed_laps(&self) -> usize {
        self.lap_durations.len()
    }

    pub fn best_lap(&self) -> Option<f64> {
        self.lap_durations.iter().copied().reduce(f64::min)
    }

    pub fn current_lap_time(&self) -> f64 {
        self.current_lap_time
    }

    pub fn predicted_next_lap(&self) -> f64 {
        self.predicted_next_lap
    }

    pub fn route(&self) -> &[Coordinate] {
        &self.route
    }

    pub fn speed_log(&self) -> &[SpeedSample] {
        &self.speed_log
    }

    pub fn accel_log(&self) -> &[AccelSample] {
        &self.accel_log
    }

    pub fn estimate(&self) -> SpeedEstimate {
        self.tracker.estimate()
    }

    pub fn status(&self) -> LiveStatus {
        let estimate = self.tracker.estimate();
        LiveStatus {
            timestamp: self.tracker.last_timestamp().unwrap_or_default(),
            phase: self.phase.as_str().to_string(),
            speed: estimate.speed,
            distance: estimate.distance,
            stationary: self.tracker.is_stationary(),
            fix_status: self.tracker.fix_status(),
            elapsed: self.current_lap_time,
            completed_laps: self.completed_laps(),
            current_lap_time: self.current_lap_time,
            predicted_next_lap: self.predicted_next_lap,
            ..LiveStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_m;
    use approx::assert_abs_diff_eq;

    const START: Coordinate = Coordinate { latitude: 45.6156, longitude: 9.2811 };

    fn session() -> LapSession {
        let config = LapConfig::for_track(Track::new("Monza", START));
        LapSession::new(config, EstimatorConfig::default()).unwrap()
    }

    fn fix_near(timestamp: f64, north_m: f64) -> PositionFix {
        let c = offset_m(START, north_m, 0.0);
        PositionFix::new(timestamp, 30.0, 4.0, c.latitude, c.longitude)
    }

    #[test]
    fn test_requires_track() {
        let result = LapSession::new(LapConfig::default(), EstimatorConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingTrack)));

        let bad = LapConfig::for_track(Track::new("nowhere", Coordinate::new(f64::NAN, 0.0)));
        assert!(matches!(
            LapSession::new(bad, EstimatorConfig::default()),
            Err(ConfigError::InvalidTrack(_))
        ));
    }

    #[test]
    fn test_retrigger_guard() {
        let mut s = session();
        assert_eq!(s.on_position(&fix_near(0.0, 3.0)), Some(LapEvent::ClockStarted { timestamp: 0.0 }));
        assert_eq!(s.on_position(&fix_near(2.0, 4.0)), None);
        assert_eq!(s.phase(), LapPhase::Timing);
        assert!(s.lap_durations().is_empty());
    }

    #[test]
    fn test_laps_and_prediction() {
        let mut s = session();
        s.on_position(&fix_near(0.0, 2.0));
        s.on_position(&fix_near(30.0, 800.0));
        let lap1 = s.on_position(&fix_near(60.0, 5.0));
        assert_eq!(lap1, Some(LapEvent::LapCompleted { lap: 1, duration: 60.0, new_best: true }));
        // lingering one second later
        assert_eq!(s.on_position(&fix_near(61.0, 1.0)), None);
        let lap2 = s.on_position(&fix_near(125.0, 0.0));
        assert_eq!(lap2, Some(LapEvent::LapCompleted { lap: 2, duration: 65.0, new_best: false }));
        assert_eq!(s.lap_durations(), &[60.0, 65.0]);
        // fresh crossing: no pacing signal yet
        assert_abs_diff_eq!(s.predicted_next_lap(), 62.5, epsilon = 1e-12);

        s.on_position(&fix_near(155.0, 900.0));
        assert_abs_diff_eq!(s.current_lap_time(), 30.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.predicted_next_lap(), 62.5 * 30.0 / 65.0, epsilon = 1e-9);
        assert_eq!(s.best_lap(), Some(60.0));
    }

    #[test]
    fn test_far_or_inaccurate_fixes_ignored() {
        let mut s = session();
        assert_eq!(s.on_position(&fix_near(0.0, 15.0)), None);
        let mut sloppy = fix_near(1.0, 0.0);
        sloppy.horizontal_accuracy = 25.0;
        assert_eq!(s.on_position(&sloppy), None);
        assert_eq!(s.phase(), LapPhase::WaitingForFirstCross);
        assert!(s.route().is_empty());
    }

    #[test]
    fn test_prediction_rules() {
        assert_eq!(predict_next_lap(&[], 12.0), 0.0);
        assert_eq!(predict_next_lap(&[50.0, 70.0], 0.0), 60.0);
        assert_abs_diff_eq!(predict_next_lap(&[50.0, 70.0], 35.0), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_logs_accumulate_only_while_timing() {
        let mut s = session();
        for k in 0..10 {
            s.on_inertial(&InertialFrame::new(k as f64 * 0.02, [0.2, 0.0, 0.0], [0.0; 3]));
        }
        assert!(s.speed_log().is_empty());

        s.on_position(&fix_near(0.2, 0.0));
        for k in 10..20 {
            s.on_inertial(&InertialFrame::new(k as f64 * 0.02, [0.2, 0.0, 0.0], [0.0; 3]));
        }
        assert_eq!(s.speed_log().len(), 10);
        assert_eq!(s.accel_log().len(), 10);
        assert_abs_diff_eq!(s.accel_log()[0].magnitude, 0.2, epsilon = 1e-12);
        assert_eq!(s.route().len(), 1);

        let record = s.finish().unwrap();
        assert_eq!(record.speed_log.len(), 10);
        assert_eq!(record.track_name, "Monza");
        assert!(s.finish().is_none());

        s.on_inertial(&InertialFrame::new(1.0, [0.2, 0.0, 0.0], [0.0; 3]));
        s.on_position(&fix_near(70.0, 0.0));
        assert!(s.speed_log().is_empty());
        assert!(s.route().is_empty());
        assert!(s.lap_durations().is_empty());
    }

    #[test]
    fn test_parked_resets_estimator() {
        let mut s = session();
        s.on_position(&fix_near(0.0, 0.0));
        for k in 0..20 {
            s.on_inertial(&InertialFrame::new(k as f64 * 0.02, [0.3, 0.0, 0.0], [0.0; 3]));
        }
        assert!(s.estimate().distance > 0.0);
        for k in 20..200 {
            s.on_inertial(&InertialFrame::new(k as f64 * 0.02, [0.0; 3], [0.0; 3]));
        }
        assert_eq!(s.estimate(), SpeedEstimate::default());
        assert_eq!(s.status().distance, 0.0);
        // the lap clock and logs keep running through the reset
        assert_eq!(s.phase(), LapPhase::Timing);
        assert_eq!(s.speed_log().len(), 200);
        assert_abs_diff_eq!(s.current_lap_time(), 3.98, epsilon = 1e-9);
    }

    #[test]
    fn test_record_contents() {
        let mut s = session();
        s.on_position(&fix_near(0.0, 0.0));
        s.on_position(&fix_near(45.0, 0.0));
        s.on_position(&fix_near(88.0, 0.0));
        let record = s.finish().unwrap();
        assert_eq!(record.lap_durations, vec![45.0, 43.0]);
        assert_eq!(record.best_lap, Some(43.0));
        assert_eq!(record.route.len(), 3);
        assert!(record.session_id.starts_with("lap_"));
        assert!(chrono::DateTime::parse_from_rfc3339(&record.recorded_at).is_ok());
    }
}
