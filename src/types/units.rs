use serde::{Deserialize, Serialize};

/// Metres per second in one mile per hour.
pub const MPS_PER_MPH: f64 = 0.44704;

/// Metres per second in one kilometre per hour.
pub const MPS_PER_KMH: f64 = 1.0 / 3.6;

/// Unit used when presenting speeds. Everything inside the crate is m/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    MetersPerSecond,
    KilometersPerHour,
    MilesPerHour,
}

impl SpeedUnit {
    /// Convert a speed in m/s into this unit.
    pub fn from_mps(self, mps: f64) -> f64 {
        match self {
            SpeedUnit::MetersPerSecond => mps,
            SpeedUnit::KilometersPerHour => mps / MPS_PER_KMH,
            SpeedUnit::MilesPerHour => mps / MPS_PER_MPH,
        }
    }

    /// Convert a speed given in this unit into m/s.
    pub fn to_mps(self, value: f64) -> f64 {
        match self {
            SpeedUnit::MetersPerSecond => value,
            SpeedUnit::KilometersPerHour => value * MPS_PER_KMH,
            SpeedUnit::MilesPerHour => value * MPS_PER_MPH,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpeedUnit::MetersPerSecond => "m/s",
            SpeedUnit::KilometersPerHour => "km/h",
            SpeedUnit::MilesPerHour => "mph",
        }
    }
}
