//! Serial device connector backed by the `serialport` crate.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::debug;

use crate::error::{LineError, Result};
use crate::traits::{Connector, Line};

/// Baud rate used by every ASL probe.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Default device path.
pub const DEFAULT_TTY: &str = "/dev/ttyUSB0";

/// Serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    /// How long a read may block before failing with `TimedOut`.
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// ASL line settings (19200 8N2, no flow control) for the given device.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::Two,
            parity: Parity::None,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TTY)
    }
}

/// Opens the configured serial device.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn open_error(&self, source: serialport::Error) -> LineError {
        LineError::Open {
            path: self.settings.path.clone(),
            source,
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self) -> Result<Box<dyn Line>> {
        let s = &self.settings;
        let builder = serialport::new(&s.path, s.baud_rate)
            .data_bits(s.data_bits)
            .stop_bits(s.stop_bits)
            .parity(s.parity)
            .flow_control(s.flow_control)
            .timeout(s.read_timeout);

        // The reader and writer each hold their own handle on the tty.
        #[cfg(unix)]
        let line: Box<dyn Line> = {
            let mut port = builder.open_native().map_err(|e| self.open_error(e))?;
            port.set_exclusive(false).map_err(|e| self.open_error(e))?;
            Box::new(port)
        };

        #[cfg(not(unix))]
        let line: Box<dyn Line> = Box::new(builder.open().map_err(|e| self.open_error(e))?);

        debug!(path = %s.path, baud = s.baud_rate, "serial port opened");
        Ok(line)
    }

    fn name(&self) -> String {
        self.settings.path.clone()
    }
}

/// List the serial devices present on this host.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(LineError::Enumerate)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_asl_line() {
        let s = SerialSettings::default();
        assert_eq!(s.path, "/dev/ttyUSB0");
        assert_eq!(s.baud_rate, 19_200);
        assert_eq!(s.data_bits, DataBits::Eight);
        assert_eq!(s.stop_bits, StopBits::Two);
        assert_eq!(s.parity, Parity::None);
        assert_eq!(s.flow_control, FlowControl::None);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let s = SerialSettings::new("/dev/ttyS1")
            .with_read_timeout(Duration::from_millis(250))
            .with_baud_rate(9600);
        assert_eq!(s.read_timeout, Duration::from_millis(250));
        assert_eq!(s.baud_rate, 9600);
        assert_eq!(SerialConnector::new(s).name(), "/dev/ttyS1");
    }

    #[test]
    fn opening_missing_device_fails() {
        let connector = SerialConnector::new(SerialSettings::new("/dev/asl-does-not-exist"));
        let err = connector.open().err().unwrap();
        assert!(matches!(
            err,
            LineError::Open { ref path, .. } if path == "/dev/asl-does-not-exist"
        ));
    }
}
