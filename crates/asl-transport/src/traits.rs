use std::io::{Read, Write};

use crate::error::Result;

/// An open, bidirectional byte stream to the bus.
///
/// Reads may fail with `ErrorKind::TimedOut` when the line stays quiet for
/// longer than the configured read timeout.
pub trait Line: Read + Write + Send {}

impl<T: Read + Write + Send> Line for T {}

/// Opens lines to one bus device.
///
/// Both halves of the bus hold the same connector and open their own line,
/// so an implementation must allow more than one line to be open at once.
pub trait Connector: Send + Sync {
    /// Open a fresh line.
    fn open(&self) -> Result<Box<dyn Line>>;

    /// Human-readable name of the device, used in logs and errors.
    fn name(&self) -> String;
}
