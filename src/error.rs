use thiserror::Error;

/// Configuration rejected before a session starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Drag session needs a target speed or a target distance")]
    MissingTarget,

    #[error("Invalid target {name}: {value}")]
    InvalidTarget { name: &'static str, value: f64 },

    #[error("Lap session started without a track")]
    MissingTrack,

    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Config I/O error: {0}")]
    Io(String),

    #[error("Config parse error: {0}")]
    Parse(String),
}

/// Errors surfaced by the session runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeedtrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session already finished")]
    SessionClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SpeedtrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: SpeedtrapError = ConfigError::MissingTrack.into();
        assert_eq!(err, SpeedtrapError::Config(ConfigError::MissingTrack));
        assert_eq!(err.to_string(), "Lap session started without a track");
    }

    #[test]
    fn test_parameter_message() {
        let err = ConfigError::InvalidParameter { name: "drift_decay", value: 1.5 };
        assert_eq!(err.to_string(), "Invalid parameter drift_decay: 1.5");
    }
}
