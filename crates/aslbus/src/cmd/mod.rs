use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use asl_bus::Bus;
use asl_config::MinderConfig;
use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::exit::{bus_error, config_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod monitor;
pub mod ports;
pub mod scan;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover probes on the bus.
    Scan(ScanArgs),
    /// Attach probes and print their readings.
    Monitor(MonitorArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Decode frame text.
    Decode(DecodeArgs),
    /// Print the wire text of a frame.
    Encode(EncodeArgs),
    /// List serial ports.
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Scan(args) => scan::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the bus lives.
#[derive(Args, Debug, Default)]
pub struct LineArgs {
    /// Serial device. Defaults to the config file's `tty`.
    #[arg(long, env = "ASLBUS_TTY")]
    pub tty: Option<String>,
    /// Rig configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "ASLBUS_CONFIG")]
    pub config: Option<PathBuf>,
}

impl LineArgs {
    pub fn load_config(&self) -> CliResult<MinderConfig> {
        match &self.config {
            Some(path) => MinderConfig::load_or_default(path)
                .map_err(|err| config_error("config load failed", err)),
            None => Ok(MinderConfig::default()),
        }
    }

    pub fn tty(&self, config: &MinderConfig) -> String {
        self.tty.clone().unwrap_or_else(|| config.tty.clone())
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub line: LineArgs,
    /// Number of probes to find.
    #[arg(long, default_value = "2")]
    pub count: usize,
    /// Scan timeout (e.g. 60s, 500ms). Defaults to the config's scan_timeout.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Write the found serials to the config file as irrigation/runoff probes.
    #[arg(long, requires = "config")]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub line: LineArgs,
    /// Probe serials (comma-separated). Defaults to the config's probes.
    #[arg(long, value_delimiter = ',')]
    pub serial: Vec<String>,
    /// Time between printed readings (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub interval: String,
    /// Exit after printing N rounds of readings.
    #[arg(long)]
    pub count: Option<usize>,
    /// Add EC values corrected by the config's calibrations.
    #[arg(long)]
    pub calibrated: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub line: LineArgs,
    /// 13-character serial to address.
    pub serial: String,
    /// 2-character command code (e.g. '$0', 'F0', 'N0', 'r0').
    pub command: String,
    /// Hex payload.
    #[arg(long, default_value = "")]
    pub payload: String,
    /// Address character.
    #[arg(long, default_value = "!")]
    pub address: char,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame text. Read from stdin when omitted.
    pub frame: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// 13-character serial.
    pub serial: String,
    /// 2-character command code.
    pub command: String,
    /// Hex payload.
    #[arg(long, default_value = "")]
    pub payload: String,
    /// Address character.
    #[arg(long, default_value = "!")]
    pub address: char,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Check frame fields before they are put on the wire.
pub fn validate_frame_fields(serial: &str, command: &str, payload: &str) -> CliResult<()> {
    if serial.len() != 13 || !serial.is_ascii() {
        return Err(CliError::new(USAGE, format!("serial must be 13 ASCII characters: {serial:?}")));
    }
    if command.len() != 2 || !command.is_ascii() {
        return Err(CliError::new(
            USAGE,
            format!("command must be 2 ASCII characters: {command:?}"),
        ));
    }
    if payload.len() % 2 != 0 || !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CliError::new(USAGE, "payload must be an even number of hex digits"));
    }
    Ok(())
}

/// Start the bus on a worker thread and wait for it to report running.
pub fn start_bus(bus: &Bus) -> CliResult<JoinHandle<asl_bus::Result<()>>> {
    let handle = {
        let bus = bus.clone();
        thread::Builder::new()
            .name("asl-bus".into())
            .spawn(move || bus.run())
            .map_err(|err| CliError::new(INTERNAL, format!("failed to start bus thread: {err}")))?
    };

    let start = Instant::now();
    while !bus.is_running() {
        if handle.is_finished() {
            return match handle.join() {
                Ok(Err(err)) => Err(bus_error("bus failed to start", err)),
                _ => Err(CliError::new(INTERNAL, "bus stopped during startup")),
            };
        }
        if start.elapsed() > Duration::from_secs(5) {
            return Err(CliError::new(INTERNAL, "bus did not start"));
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(handle)
}

/// Stop the bus and wait for its thread.
pub fn stop_bus(bus: &Bus, handle: JoinHandle<asl_bus::Result<()>>) {
    bus.shutdown();
    match handle.join() {
        Ok(Err(err)) => warn!(error = %err, "bus exited with error"),
        Err(_) => warn!("bus thread panicked"),
        Ok(Ok(())) => {}
    }
    info!(device = bus.name(), state = %bus.state(), "bus stopped");
}

pub fn install_ctrlc_handler(handler: impl Fn() + Send + 'static) -> CliResult<()> {
    ctrlc::set_handler(handler).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn frame_field_validation() {
        assert!(validate_frame_fields("ASL1805180001", "$0", "").is_ok());
        assert!(validate_frame_fields("ASL1805180001", "r0", "0A1b").is_ok());
        assert_eq!(validate_frame_fields("ASL180518", "$0", "").unwrap_err().code, USAGE);
        assert!(validate_frame_fields("ASL1805180001", "$", "").is_err());
        assert!(validate_frame_fields("ASL1805180001", "$0", "ABC").is_err());
        assert!(validate_frame_fields("ASL1805180001", "$0", "ZZ").is_err());
    }

    #[test]
    fn line_args_fall_back_to_config_tty() {
        let config = MinderConfig {
            tty: "/dev/ttyS4".into(),
            ..MinderConfig::default()
        };
        assert_eq!(LineArgs::default().tty(&config), "/dev/ttyS4");
        let args = LineArgs {
            tty: Some("/dev/ttyUSB1".into()),
            config: None,
        };
        assert_eq!(args.tty(&config), "/dev/ttyUSB1");
    }
}
