use std::path::PathBuf;

/// Errors that can occur loading, saving, or applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("config is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The field does not accept a calibration.
    #[error("non-translatable field {0:?}")]
    NotTranslatable(String),

    /// No calibration stored for a translatable field.
    #[error("can't find calibration constant for {0}")]
    MissingCalibration(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
