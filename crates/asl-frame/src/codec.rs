use std::ops::Range;
use std::time::SystemTime;

use tracing::debug;

use crate::command::{BROADCAST_MARKER, EOF, MASTER, NOISE_ADDRESS, PREAMBLE, READING, SOF};
use crate::error::{FrameError, Result};

const ADDRESS: usize = 1;
const SERIAL: Range<usize> = 2..15;
const COMMAND: Range<usize> = 15..17;
const COUNT_LO: Range<usize> = 17..19;
const COUNT_HI: Range<usize> = 19..21;

/// Offset of the first payload character; also the full header length.
pub const HEADER_LEN: usize = 21;

/// Characters in the trailing checksum.
pub const CRC_LEN: usize = 4;

/// Shortest frame that can carry a checksum.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CRC_LEN;

const CRC_TABLE: [u16; 256] = crc_table(0xA001);

const fn crc_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-16 (reflected 0xA001, zero init) over the frame text.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (crc >> 8) ^ CRC_TABLE[((crc ^ u16::from(b)) & 0xFF) as usize]
    })
}

/// CRC rendered the way it travels: 4 uppercase hex digits, high byte first.
pub fn checksum(data: &[u8]) -> String {
    format!("{:04X}", crc16(data))
}

/// Parse a hex field into an integer, first byte most significant.
///
/// An empty field is zero.
pub fn hex_to_int(hex: &str) -> Result<u64> {
    if hex.is_empty() {
        return Ok(0);
    }
    if hex.len() > 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FrameError::InvalidHex(hex.to_string()));
    }
    u64::from_str_radix(hex, 16).map_err(|_| FrameError::InvalidHex(hex.to_string()))
}

/// One frame exchanged on the bus.
#[derive(Debug, Clone)]
pub struct Frame {
    /// When the frame was built or received.
    pub timestamp: SystemTime,
    /// Sender (on receive) or recipient class (on transmit).
    pub address: char,
    /// 13-character device identity.
    pub serial: String,
    /// 2-character command code.
    pub command: String,
    /// Declared payload length in bytes.
    pub byte_count: usize,
    /// Hex-encoded payload, `2 * byte_count` characters.
    pub payload: String,
    /// 4 hex digits as carried on the wire.
    pub checksum: String,
    /// Frame text from `:` through the checksum.
    pub raw: String,
}

impl Frame {
    /// Bytes to put on the line: preamble, frame text, end-of-frame byte.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.wire_size());
        wire.extend_from_slice(PREAMBLE.as_bytes());
        wire.extend_from_slice(self.raw.as_bytes());
        wire.push(EOF);
        wire
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        PREAMBLE.len() + self.raw.len() + 1
    }

    /// Returns true for a reading response carrying data.
    pub fn is_reading(&self) -> bool {
        self.command == READING && self.byte_count > 0
    }

    /// Decode the hex payload into raw bytes.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        let hex = self.payload.as_bytes();
        if hex.len() % 2 != 0 {
            return Err(FrameError::InvalidHex(self.payload.clone()));
        }
        hex.chunks(2)
            .map(|pair| {
                let pair = std::str::from_utf8(pair)
                    .map_err(|_| FrameError::InvalidHex(self.payload.clone()))?;
                Ok(hex_to_int(pair)? as u8)
            })
            .collect()
    }
}

/// Build a frame for transmission.
///
/// Wire format:
/// ```text
/// ┌─────┬──────┬────────┬─────┬─────────┬──────────┬─────┬──────┐
/// │ SOF │ Addr │ Serial │ Cmd │ Count   │ Payload  │ CRC │ EOF  │
/// │ ':' │ (1)  │ (13)   │ (2) │ (4 hex) │ (2N hex) │ (4) │ 0x04 │
/// └─────┴──────┴────────┴─────┴─────────┴──────────┴─────┴──────┘
/// ```
/// The count's low byte pair comes first. The CRC covers SOF through the
/// payload. `UU` is sent ahead of SOF.
pub fn encode_frame(address: char, serial: &str, command: &str, payload: &str) -> Frame {
    let byte_count = payload.len() / 2;
    let count = format!("{:04X}", byte_count);

    let mut raw = String::with_capacity(MIN_FRAME_LEN + payload.len());
    raw.push(char::from(SOF));
    raw.push(address);
    raw.push_str(serial);
    raw.push_str(command);
    raw.push_str(&count[2..4]);
    raw.push_str(&count[0..2]);
    if byte_count != 0 {
        raw.push_str(payload);
    }

    let checksum = checksum(raw.as_bytes());
    raw.push_str(&checksum);

    Frame {
        timestamp: SystemTime::now(),
        address,
        serial: serial.to_string(),
        command: command.to_string(),
        byte_count,
        payload: payload.to_string(),
        checksum,
        raw,
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode a frame received from the line.
///
/// Leading preamble, trailing end-of-frame bytes, and any noise before the
/// last `:` are discarded. [`FrameError::FromMaster`] means the frame is a
/// master echo and should be ignored rather than reported.
pub fn decode_frame(input: impl AsRef<[u8]>) -> Result<Frame> {
    let mut raw = input.as_ref().trim_ascii();
    while let [b'U', rest @ ..] = raw {
        raw = rest;
    }
    while let [rest @ .., EOF] = raw {
        raw = rest;
    }

    let start = raw
        .iter()
        .rposition(|&b| b == SOF)
        .ok_or(FrameError::NoStartChar)?;
    let raw = &raw[start..];

    if raw.len() < HEADER_LEN {
        return Err(FrameError::TooShort);
    }
    if raw.len() < MIN_FRAME_LEN {
        return Err(FrameError::NoCrc);
    }

    let count = [&raw[COUNT_HI], &raw[COUNT_LO]].concat();
    let byte_count = hex_to_int(&text(&count))? as usize;
    if raw.len() < MIN_FRAME_LEN + 2 * byte_count {
        return Err(FrameError::SizeMismatch);
    }

    let address = raw[ADDRESS];
    if address == MASTER as u8 || address == NOISE_ADDRESS {
        return Err(FrameError::FromMaster);
    }

    let serial = &raw[SERIAL];
    if serial.contains(&BROADCAST_MARKER) {
        return Err(FrameError::InvalidChar);
    }

    let command = text(&raw[COMMAND]);
    let payload = text(&raw[HEADER_LEN..HEADER_LEN + 2 * byte_count]);

    let (body, crc) = raw.split_at(raw.len() - CRC_LEN);
    let received = hex_to_int(&text(crc))? as u16;
    let calculated = crc16(body);
    if received != calculated {
        debug!(
            received = format_args!("{received:04X}"),
            calculated = format_args!("{calculated:04X}"),
            "frame rejected"
        );
        return Err(FrameError::ChecksumMismatch {
            received,
            calculated,
        });
    }

    if command == READING && byte_count == 0 {
        return Err(FrameError::FromMaster);
    }

    Ok(Frame {
        timestamp: SystemTime::now(),
        address: char::from(address),
        serial: text(serial),
        command,
        byte_count,
        payload,
        checksum: text(crc),
        raw: text(raw),
    })
}
