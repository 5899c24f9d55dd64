use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Fields that accept a calibration.
pub const TRANSLATABLE_FIELDS: [&str; 6] = [
    "irrig_ph",
    "irrig_ec",
    "runoff_ph",
    "runoff_ec",
    "irrig_volume",
    "runoff_volume",
];

pub fn is_translatable(field: &str) -> bool {
    TRANSLATABLE_FIELDS.contains(&field)
}

/// Linear correction applied to a raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
}

impl Calibration {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// `value * scale + offset`
    pub fn transform(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

/// Store of per-field calibrations.
pub trait Translator {
    /// Set the calibration for a translatable field.
    fn set_calibration(&mut self, field: &str, calibration: Calibration) -> Result<()>;

    /// Stored calibration for a field.
    fn calibration(&self, field: &str) -> Result<Calibration>;

    /// Apply the stored calibration to a raw value.
    fn translate(&self, field: &str, value: f64) -> Result<f64> {
        Ok(self.calibration(field)?.transform(value))
    }
}

/// In-memory [`Translator`] keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    entries: BTreeMap<String, Calibration>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from stored entries, rejecting unknown fields.
    pub fn from_entries(entries: &BTreeMap<String, Calibration>) -> Result<Self> {
        let mut table = Self::new();
        for (field, calibration) in entries {
            table.set_calibration(field, *calibration)?;
        }
        Ok(table)
    }

    pub fn entries(&self) -> &BTreeMap<String, Calibration> {
        &self.entries
    }

    pub fn into_entries(self) -> BTreeMap<String, Calibration> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Translator for CalibrationTable {
    fn set_calibration(&mut self, field: &str, calibration: Calibration) -> Result<()> {
        if !is_translatable(field) {
            return Err(ConfigError::NotTranslatable(field.to_string()));
        }
        self.entries.insert(field.to_string(), calibration);
        Ok(())
    }

    fn calibration(&self, field: &str) -> Result<Calibration> {
        if !is_translatable(field) {
            return Err(ConfigError::NotTranslatable(field.to_string()));
        }
        self.entries
            .get(field)
            .copied()
            .ok_or_else(|| ConfigError::MissingCalibration(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_is_linear() {
        let c = Calibration::new(1.1, -0.2);
        assert!((c.transform(2.0) - 2.0).abs() < 1e-9);
        assert_eq!(Calibration::default().transform(3.5), 3.5);
    }

    #[test]
    fn translate_uses_stored_calibration() {
        let mut table = CalibrationTable::new();
        table
            .set_calibration("irrig_ec", Calibration::new(2.0, 0.5))
            .unwrap();

        assert_eq!(table.translate("irrig_ec", 1.5).unwrap(), 3.5);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut table = CalibrationTable::new();
        let err = table
            .set_calibration("irrig_moisture", Calibration::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotTranslatable(f) if f == "irrig_moisture"));
        assert!(matches!(
            table.translate("nope", 1.0),
            Err(ConfigError::NotTranslatable(_))
        ));
    }

    #[test]
    fn missing_calibration_is_an_error() {
        let table = CalibrationTable::new();
        let err = table.translate("runoff_ec", 1.0).unwrap_err();
        assert_eq!(err.to_string(), "can't find calibration constant for runoff_ec");
    }

    #[test]
    fn from_entries_validates_every_field() {
        let mut entries = BTreeMap::new();
        entries.insert("runoff_ph".to_string(), Calibration::new(1.0, 0.1));
        assert_eq!(CalibrationTable::from_entries(&entries).unwrap().len(), 1);

        entries.insert("bogus".to_string(), Calibration::default());
        assert!(CalibrationTable::from_entries(&entries).is_err());
    }
}
