//! Rig configuration for the ASL bus.
//!
//! [`MinderConfig`] is the JSON file shared with the rest of the rig: it
//! names the serial device, the scan timeout, which probe serial sits on
//! the irrigation and runoff lines, and per-field calibrations.

pub mod calibration;
pub mod config;
pub mod error;

pub use calibration::{
    is_translatable, Calibration, CalibrationTable, Translator, TRANSLATABLE_FIELDS,
};
pub use config::{MinderConfig, DEFAULT_SCAN_TIMEOUT_SECS, DEFAULT_TTY};
pub use error::{ConfigError, Result};
