use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::error::{LineError, Result};
use crate::traits::{Connector, Line};

/// A line that remembers whether it is open.
///
/// Closing drops the underlying stream; the next [`LinePort::open`] goes back
/// to the connector for a new one.
pub struct LinePort {
    connector: Arc<dyn Connector>,
    line: Option<Box<dyn Line>>,
}

impl LinePort {
    /// Create a closed port for the given connector.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            line: None,
        }
    }

    /// Open the line, replacing any stream that is already open.
    pub fn open(&mut self) -> Result<()> {
        self.line = None;
        let line = self.connector.open()?;
        debug!(device = %self.connector.name(), "line opened");
        self.line = Some(line);
        Ok(())
    }

    /// Open the line only if it is currently closed.
    pub fn ensure_open(&mut self) -> Result<()> {
        if self.is_closed() {
            self.open()?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.line.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.line.is_none()
    }

    /// Close the line. Closing a closed port is a no-op.
    pub fn close(&mut self) {
        if self.line.take().is_some() {
            debug!(device = %self.connector.name(), "line closed");
        }
    }

    /// Borrow the open stream.
    pub fn line_mut(&mut self) -> Result<&mut Box<dyn Line>> {
        let name = self.connector.name();
        self.line.as_mut().ok_or(LineError::Closed(name))
    }

    /// Device name of the underlying connector.
    pub fn name(&self) -> String {
        self.connector.name()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "line is closed")
}

impl Read for LinePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.line.as_mut() {
            Some(line) => line.read(buf),
            None => Err(not_connected()),
        }
    }
}

impl Write for LinePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.line.as_mut() {
            Some(line) => line.write(buf),
            None => Err(not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.line.as_mut() {
            Some(line) => line.flush(),
            None => Err(not_connected()),
        }
    }
}

impl fmt::Debug for LinePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinePort")
            .field("device", &self.connector.name())
            .field("open", &self.is_open())
            .finish()
    }
}
