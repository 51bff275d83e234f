use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;

/// Positioning signal state as seen by display code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    #[default]
    NoFix,
    Valid,
    Stale,
}

impl FixStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FixStatus::NoFix => "no fix",
            FixStatus::Valid => "valid",
            FixStatus::Stale => "stale",
        }
    }
}

/// Report of signal health at one instant (sample time).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub fix_status: FixStatus,
    pub fix_age_secs: Option<f64>,
    pub inertial_healthy: bool,
    pub inertial_silence_secs: Option<f64>,
    pub accepted_fixes: u64,
    pub rejected_fixes: u64,
}

/// Tracks how recently each sample stream delivered usable data.
///
/// Everything runs on sample timestamps, never the wall clock, so a replayed
/// log reports exactly what the live run saw.
#[derive(Clone, Debug)]
pub struct SignalHealth {
    fix_timeout: f64,
    inertial_timeout: f64,
    last_fix: Option<f64>,
    last_frame: Option<f64>,
    accepted_fixes: u64,
    rejected_fixes: u64,
    // transition latches so each degradation is logged once
    fix_stale_reported: bool,
    inertial_silent_reported: bool,
}

impl SignalHealth {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            fix_timeout: config.fix_timeout_secs,
            inertial_timeout: config.inertial_timeout_secs,
            last_fix: None,
            last_frame: None,
            accepted_fixes: 0,
            rejected_fixes: 0,
            fix_stale_reported: false,
            inertial_silent_reported: false,
        }
    }

    pub fn record_fix(&mut self, timestamp: f64, accepted: bool) {
        if accepted {
            self.accepted_fixes += 1;
            if timestamp.is_finite() {
                self.last_fix = Some(self.last_fix.map_or(timestamp, |t| t.max(timestamp)));
            }
            if self.fix_stale_reported {
                log::info!("GPS fix recovered at t={:.2}", timestamp);
                self.fix_stale_reported = false;
            }
        } else {
            self.rejected_fixes += 1;
        }
    }

    /// Record an inertial frame and log stream transitions.
    pub fn record_frame(&mut self, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        if let Some(last) = self.last_frame {
            let gap = timestamp - last;
            if gap > self.inertial_timeout && !self.inertial_silent_reported {
                log::warn!("Inertial stream silent for {:.2}s", gap);
                self.inertial_silent_reported = true;
            } else if gap <= self.inertial_timeout {
                self.inertial_silent_reported = false;
            }
        }
        self.last_frame = Some(self.last_frame.map_or(timestamp, |t| t.max(timestamp)));

        if self.fix_status(timestamp) == FixStatus::Stale && !self.fix_stale_reported {
            log::warn!(
                "GPS fix stale ({:.1}s without an accepted fix), dead-reckoning",
                self.fix_age(timestamp).unwrap_or_default()
            );
            self.fix_stale_reported = true;
        }
    }

    pub fn fix_age(&self, now: f64) -> Option<f64> {
        self.last_fix.map(|t| (now - t).max(0.0))
    }

    pub fn fix_status(&self, now: f64) -> FixStatus {
        match self.fix_age(now) {
            None => FixStatus::NoFix,
            Some(age) if age > self.fix_timeout => FixStatus::Stale,
            Some(_) => FixStatus::Valid,
        }
    }

    pub fn report(&self, now: f64) -> HealthReport {
        let inertial_silence = self.last_frame.map(|t| (now - t).max(0.0));
        HealthReport {
            fix_status: self.fix_status(now),
            fix_age_secs: self.fix_age(now),
            inertial_healthy: inertial_silence.is_some_and(|s| s <= self.inertial_timeout),
            inertial_silence_secs: inertial_silence,
            accepted_fixes: self.accepted_fixes,
            rejected_fixes: self.rejected_fixes,
        }
    }

    pub fn format_status(&self, now: f64) -> String {
        let report = self.report(now);

        let gps = match report.fix_status {
            FixStatus::Valid => "✓".to_string(),
            FixStatus::NoFix => "⚠ (no fix)".to_string(),
            FixStatus::Stale => format!("⚠ (stale {:.1}s)", report.fix_age_secs.unwrap_or_default()),
        };
        let imu = if report.inertial_healthy {
            "✓".to_string()
        } else {
            format!("⚠ (silent {:.1}s)", report.inertial_silence_secs.unwrap_or_default())
        };

        format!(
            "Health: IMU {} | GPS {} ({} accepted, {} rejected)",
            imu, gps, report.accepted_fixes, report.rejected_fixes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health() -> SignalHealth {
        SignalHealth::new(&EstimatorConfig::default())
    }

    #[test]
    fn test_fix_status_transitions() {
        let mut h = health();
        assert_eq!(h.fix_status(0.0), FixStatus::NoFix);

        h.record_fix(1.0, true);
        assert_eq!(h.fix_status(2.0), FixStatus::Valid);
        assert_eq!(h.fix_status(4.5), FixStatus::Stale);

        h.record_fix(4.6, true);
        assert_eq!(h.fix_status(4.7), FixStatus::Valid);
    }

    #[test]
    fn test_rejected_fix_does_not_refresh() {
        let mut h = health();
        h.record_fix(1.0, true);
        h.record_fix(5.0, false);
        assert_eq!(h.fix_status(5.0), FixStatus::Stale);
        let report = h.report(5.0);
        assert_eq!(report.accepted_fixes, 1);
        assert_eq!(report.rejected_fixes, 1);
    }

    #[test]
    fn test_inertial_silence() {
        let mut h = health();
        assert!(!h.report(0.0).inertial_healthy);
        h.record_frame(0.0);
        h.record_frame(0.02);
        assert!(h.report(0.1).inertial_healthy);
        assert!(!h.report(1.0).inertial_healthy);
    }

    #[test]
    fn test_stale_warning_latches() {
        let mut h = health();
        h.record_fix(0.0, true);
        h.record_frame(5.0);
        assert!(h.fix_stale_reported);
        h.record_fix(5.1, true);
        assert!(!h.fix_stale_reported);
    }

    #[test]
    fn test_format_status() {
        let mut h = health();
        h.record_frame(0.0);
        h.record_fix(0.0, true);
        let status = h.format_status(0.1);
        assert!(status.contains("IMU ✓"));
        assert!(status.contains("GPS ✓"));
        assert!(h.format_status(10.0).contains("stale"));
    }
}
