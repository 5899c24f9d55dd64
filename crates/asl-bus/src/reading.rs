//! Decoding of the EC probe reading payload.
//!
//! The payload is 33 hex fields: 12 single bytes (status, spare, firmware
//! lo/hi, two status-bool words as lo/hi bytes, EC lo/hi, temperature
//! lo/hi), 10 reserved longs, 1 reserved word, then 4 bytes each of
//! extended EC and temperature (least significant first), a spare byte and
//! the signal byte.

use asl_frame::hex_to_int;
use serde::Serialize;

use crate::error::{BusError, Result};

const BYTE: usize = 2;
const WORD: usize = 4;
const LONG: usize = 8;

const LAYOUT: [usize; 33] = [
    BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, BYTE, // header bytes
    LONG, LONG, LONG, LONG, LONG, LONG, LONG, LONG, LONG, LONG, // reserved
    WORD, // reserved
    BYTE, BYTE, BYTE, BYTE, // ec_real
    BYTE, BYTE, BYTE, BYTE, // temp_real
    BYTE, BYTE, // spare, signal
];

/// Hex characters in a complete reading payload.
pub const READING_PAYLOAD_LEN: usize = 128;

const STATUS: usize = 0;
const FIRMWARE_LO: usize = 2;
const FIRMWARE_HI: usize = 3;
const EC_LO: usize = 8;
const EC_HI: usize = 9;
const TEMP_LO: usize = 10;
const TEMP_HI: usize = 11;
const EC_REAL: usize = 23;
const TEMP_REAL: usize = 27;
const SIGNAL: usize = 32;

/// Values reported by an EC probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub status: u8,
    pub firmware_version: String,
    pub ec: f64,
    pub ec_real: f64,
    pub temperature: f64,
    pub temperature_real: f64,
    pub signal: u8,
}

impl Reading {
    /// Decode a reading payload.
    ///
    /// A short payload decodes the fields it covers; the rest read as zero.
    pub fn decode(payload: &str) -> Result<Self> {
        if payload.is_empty() {
            return Err(BusError::MalformedReading("readings packet contains no data".into()));
        }

        let mut fields = [0u64; LAYOUT.len()];
        let mut index = 0;
        for (slot, width) in fields.iter_mut().zip(LAYOUT) {
            let end = index + width;
            let Some(hex) = payload.get(index..end) else {
                break;
            };
            *slot = hex_to_int(hex).map_err(|e| BusError::MalformedReading(e.to_string()))?;
            index = end;
        }

        let pair = |lo: usize, hi: usize| fields[lo] + (fields[hi] << 8);
        let quad = |at: usize| {
            fields[at] + (fields[at + 1] << 8) + (fields[at + 2] << 16) + (fields[at + 3] << 24)
        };

        Ok(Self {
            status: fields[STATUS] as u8,
            firmware_version: format!("V{:.2}", pair(FIRMWARE_LO, FIRMWARE_HI) as f64 / 100.0),
            ec: pair(EC_LO, EC_HI) as f64 / 100.0,
            ec_real: quad(EC_REAL) as f64,
            temperature: pair(TEMP_LO, TEMP_HI) as f64 / 100.0,
            temperature_real: quad(TEMP_REAL) as f64,
            signal: fields[SIGNAL] as u8,
        })
    }
}
