//! ASL bus framing.
//!
//! Frames are ASCII text on the wire:
//! - a `UU` preamble
//! - `:` start-of-frame, 1-char address, 13-char serial, 2-char command
//! - 4 hex digits of byte count (low pair first), then the hex payload
//! - a 4 hex digit CRC-16 over everything before it
//! - a `0x04` end-of-frame byte
//!
//! [`FrameReader`] splits a byte stream on the end-of-frame byte and
//! [`FrameWriter`] puts encoded frames on the line.

pub mod codec;
pub mod command;
pub mod error;
pub mod fifo;
pub mod reader;
pub mod writer;

pub use codec::{checksum, crc16, decode_frame, encode_frame, hex_to_int, Frame};
pub use command::{
    command_name, DISABLE_PING, ENABLE_PING, EOF, MASTER, NOISE_ADDRESS, PING, PING_SERIAL,
    PREAMBLE, PROBE, READING, SOF,
};
pub use error::{FrameError, Result};
pub use fifo::{Fifo, DEFAULT_FIFO_CAPACITY};
pub use reader::{FrameReader, ReaderConfig, MAX_FRAME_SIZE};
pub use writer::FrameWriter;
