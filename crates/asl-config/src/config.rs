use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::calibration::{Calibration, CalibrationTable};
use crate::error::{ConfigError, Result};

/// Default serial device for the bus.
pub const DEFAULT_TTY: &str = "/dev/ttyUSB0";

/// Default probe scan timeout.
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 60;

/// Rig configuration file.
///
/// Keys this crate doesn't know about are kept in `extra` and written back
/// on save, so the file can carry settings for other parts of the rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinderConfig {
    /// Serial device the bus runs on.
    pub tty: String,
    /// How long a probe scan may run, in seconds.
    pub scan_timeout: u64,
    /// Serial of the EC probe on the irrigation line.
    pub irrig_ec_probe: String,
    /// Serial of the EC probe on the runoff line.
    pub runoff_ec_probe: String,
    /// Calibrations keyed by field name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub calibrations: BTreeMap<String, Calibration>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for MinderConfig {
    fn default() -> Self {
        Self {
            tty: DEFAULT_TTY.to_string(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT_SECS,
            irrig_ec_probe: String::new(),
            runoff_ec_probe: String::new(),
            calibrations: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl MinderConfig {
    /// Load the config from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&data)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load the config, falling back to defaults when the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Write the config as JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout)
    }

    /// Configured probe serials, skipping unset ones.
    pub fn known_serials(&self) -> Vec<String> {
        [&self.irrig_ec_probe, &self.runoff_ec_probe]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect()
    }

    /// Place two scanned serials on the irrigation and runoff lines.
    ///
    /// A serial that is already assigned keeps its line; only the side whose
    /// serial is absent from the scan result is reassigned. Anything other
    /// than exactly two serials leaves the config unchanged.
    pub fn assign_probe_serials(&mut self, serials: &[String]) {
        let [first, last] = serials else {
            return;
        };

        let mut irrig = self.irrig_ec_probe.clone();
        let mut runoff = self.runoff_ec_probe.clone();

        if runoff != *first && runoff != *last {
            runoff = if *first != irrig { first.clone() } else { last.clone() };
        }

        if irrig != *first && irrig != *last {
            irrig = if *first != runoff { first.clone() } else { last.clone() };
        }

        debug!(%irrig, %runoff, "probe serials assigned");
        self.irrig_ec_probe = irrig;
        self.runoff_ec_probe = runoff;
    }

    /// Calibrations as a validated table.
    pub fn calibration_table(&self) -> Result<CalibrationTable> {
        CalibrationTable::from_entries(&self.calibrations)
    }

    /// Replace the stored calibrations.
    pub fn set_calibrations(&mut self, table: CalibrationTable) {
        self.calibrations = table.into_entries();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Translator;

    fn serials(a: &str, b: &str) -> Vec<String> {
        vec![a.to_string(), b.to_string()]
    }

    #[test]
    fn defaults() {
        let cfg = MinderConfig::default();
        assert_eq!(cfg.tty, "/dev/ttyUSB0");
        assert_eq!(cfg.scan_timeout(), Duration::from_secs(60));
        assert!(cfg.known_serials().is_empty());
    }

    #[test]
    fn runoff_serial_is_kept_when_scanned_first() {
        let mut cfg = MinderConfig {
            runoff_ec_probe: "1234".into(),
            ..MinderConfig::default()
        };
        cfg.assign_probe_serials(&serials("1234", "6789"));
        assert_eq!(cfg.runoff_ec_probe, "1234");
        assert_eq!(cfg.irrig_ec_probe, "6789");
    }

    #[test]
    fn runoff_serial_is_kept_when_scanned_second() {
        let mut cfg = MinderConfig {
            runoff_ec_probe: "1234".into(),
            ..MinderConfig::default()
        };
        cfg.assign_probe_serials(&serials("6789", "1234"));
        assert_eq!(cfg.runoff_ec_probe, "1234");
        assert_eq!(cfg.irrig_ec_probe, "6789");
    }

    #[test]
    fn irrig_serial_is_kept_in_either_order() {
        for pair in [serials("1234", "6789"), serials("6789", "1234")] {
            let mut cfg = MinderConfig {
                irrig_ec_probe: "1234".into(),
                ..MinderConfig::default()
            };
            cfg.assign_probe_serials(&pair);
            assert_eq!(cfg.irrig_ec_probe, "1234");
            assert_eq!(cfg.runoff_ec_probe, "6789");
        }
    }

    #[test]
    fn new_pair_replaces_both_serials() {
        let mut cfg = MinderConfig {
            irrig_ec_probe: "1234".into(),
            runoff_ec_probe: "6789".into(),
            ..MinderConfig::default()
        };
        cfg.assign_probe_serials(&serials("abcd", "efgh"));
        assert_eq!(cfg.runoff_ec_probe, "abcd");
        assert_eq!(cfg.irrig_ec_probe, "efgh");
    }

    #[test]
    fn empty_config_takes_runoff_first() {
        let mut cfg = MinderConfig::default();
        cfg.assign_probe_serials(&serials("abcd", "efgh"));
        assert_eq!(cfg.runoff_ec_probe, "abcd");
        assert_eq!(cfg.irrig_ec_probe, "efgh");
    }

    #[test]
    fn matching_pair_is_left_alone() {
        for pair in [serials("1234", "6789"), serials("6789", "1234")] {
            let mut cfg = MinderConfig {
                irrig_ec_probe: "1234".into(),
                runoff_ec_probe: "6789".into(),
                ..MinderConfig::default()
            };
            cfg.assign_probe_serials(&pair);
            assert_eq!(cfg.irrig_ec_probe, "1234");
            assert_eq!(cfg.runoff_ec_probe, "6789");
        }
    }

    #[test]
    fn wrong_serial_count_is_ignored() {
        let mut cfg = MinderConfig::default();
        cfg.assign_probe_serials(&["abcd".to_string()]);
        cfg.assign_probe_serials(&[]);
        assert!(cfg.known_serials().is_empty());
    }

    #[test]
    fn known_serials_skip_empty() {
        let cfg = MinderConfig {
            runoff_ec_probe: "ASL1805180001".into(),
            ..MinderConfig::default()
        };
        assert_eq!(cfg.known_serials(), vec!["ASL1805180001".to_string()]);
    }

    #[test]
    fn save_and_load_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minder.json");
        std::fs::write(
            &path,
            concat!(
                r#"{"tty":"/dev/ttyS3","scan_timeout":30,"#,
                r#""irrig_ec_probe":"ASL1805180001","port":"8080","moisture_gain":2}"#,
            ),
        )
        .unwrap();

        let mut cfg = MinderConfig::load_from(&path).unwrap();
        assert_eq!(cfg.tty, "/dev/ttyS3");
        assert_eq!(cfg.scan_timeout, 30);
        assert_eq!(cfg.irrig_ec_probe, "ASL1805180001");
        assert_eq!(cfg.runoff_ec_probe, "");
        assert_eq!(cfg.extra.get("port"), Some(&Value::from("8080")));

        cfg.runoff_ec_probe = "ASL1805180002".into();
        cfg.save_to(&path).unwrap();

        let reloaded = MinderConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, cfg);
        assert_eq!(reloaded.extra.get("moisture_gain"), Some(&Value::from(2)));
    }

    #[test]
    fn calibrations_round_trip_through_table() {
        let mut cfg = MinderConfig::default();
        let mut table = cfg.calibration_table().unwrap();
        table
            .set_calibration("irrig_ph", Calibration::new(1.2, -0.3))
            .unwrap();
        cfg.set_calibrations(table);

        let table = cfg.calibration_table().unwrap();
        assert_eq!(table.calibration("irrig_ph").unwrap(), Calibration::new(1.2, -0.3));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert!(matches!(MinderConfig::load_from(&path), Err(ConfigError::Io { .. })));
        assert_eq!(MinderConfig::load_or_default(&path).unwrap(), MinderConfig::default());
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            MinderConfig::load_from(&path),
            Err(ConfigError::InvalidJson(_))
        ));
    }
}
