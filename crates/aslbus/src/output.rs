use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use asl_bus::{Reading, ScanOutcome};
use asl_frame::{command_name, Frame};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    address: String,
    serial: &'a str,
    command: &'a str,
    command_name: &'static str,
    byte_count: usize,
    payload: &'a str,
    checksum: &'a str,
    raw: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reading: Option<&'a Reading>,
}

pub fn print_frame(frame: &Frame, reading: Option<&Reading>, format: OutputFormat) {
    let out = FrameOutput {
        address: frame.address.to_string(),
        serial: &frame.serial,
        command: &frame.command,
        command_name: command_name(&frame.command),
        byte_count: frame.byte_count,
        payload: &frame.payload,
        checksum: &frame.checksum,
        raw: &frame.raw,
        reading,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table();
            table
                .set_header(vec!["ADDR", "SERIAL", "COMMAND", "BYTES", "CRC"])
                .add_row(vec![
                    out.address.clone(),
                    out.serial.to_string(),
                    format!("{} ({})", out.command, out.command_name),
                    out.byte_count.to_string(),
                    out.checksum.to_string(),
                ]);
            println!("{table}");
            if let Some(reading) = reading {
                print_reading_table(reading);
            }
        }
        OutputFormat::Pretty => {
            println!(
                "addr={} serial={} command={} ({}) bytes={} crc={}",
                out.address, out.serial, out.command, out.command_name, out.byte_count, out.checksum
            );
            println!("raw={}", out.raw);
            if let Some(r) = reading {
                println!(
                    concat!(
                        "firmware={} ec={:.2} temperature={:.2} ",
                        "ec_real={} temperature_real={} status={} signal={}"
                    ),
                    r.firmware_version,
                    r.ec,
                    r.temperature,
                    r.ec_real,
                    r.temperature_real,
                    r.status,
                    r.signal
                );
            }
        }
    }
}

fn print_reading_table(r: &Reading) {
    let mut table = table();
    table
        .set_header(vec!["FIRMWARE", "EC", "TEMP", "EC REAL", "TEMP REAL", "STATUS", "SIGNAL"])
        .add_row(vec![
            r.firmware_version.clone(),
            format!("{:.2}", r.ec),
            format!("{:.2}", r.temperature),
            r.ec_real.to_string(),
            r.temperature_real.to_string(),
            r.status.to_string(),
            r.signal.to_string(),
        ]);
    println!("{table}");
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    device: &'a str,
    serials: &'a [String],
    pinged: usize,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn print_scan(device: &str, outcome: &ScanOutcome, format: OutputFormat) {
    let out = ScanOutput {
        device,
        serials: &outcome.serials,
        pinged: outcome.pinged,
        ok: outcome.is_ok(),
        error: outcome.result.as_ref().err().map(|e| e.to_string()),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["#", "SERIAL"]);
            for (i, serial) in out.serials.iter().enumerate() {
                table.add_row(vec![(i + 1).to_string(), serial.clone()]);
            }
            println!("{table}");
            println!("{} probe(s) found, {} candidate(s) pinged", out.serials.len(), out.pinged);
            if let Some(err) = &out.error {
                println!("scan failed: {err}");
            }
        }
        OutputFormat::Pretty => {
            println!(
                "device={} found={} pinged={} ok={}",
                out.device,
                out.serials.join(","),
                out.pinged,
                out.ok
            );
        }
    }
}

/// One probe's values at a point in time.
#[derive(Debug, Serialize)]
pub struct ProbeRow {
    pub serial: String,
    pub role: &'static str,
    pub ec: Option<f64>,
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibrated_ec: Option<f64>,
    pub timestamp: String,
}

impl ProbeRow {
    pub fn new(
        serial: &str,
        role: &'static str,
        ec: Option<f64>,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            serial: serial.to_string(),
            role,
            ec,
            temperature,
            calibrated_ec: None,
            timestamp: now_unix_seconds(),
        }
    }
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

pub fn print_probe_rows(rows: &[ProbeRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["SERIAL", "ROLE", "EC", "TEMP", "EC (CAL)"]);
            for row in rows {
                table.add_row(vec![
                    row.serial.clone(),
                    row.role.to_string(),
                    opt(row.ec),
                    opt(row.temperature),
                    opt(row.calibrated_ec),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "serial={} role={} ec={} temperature={} calibrated_ec={}",
                    row.serial,
                    row.role,
                    opt(row.ec),
                    opt(row.temperature),
                    opt(row.calibrated_ec)
                );
            }
        }
    }
}

#[derive(Serialize)]
struct PortsOutput<'a> {
    ports: &'a [String],
}

pub fn print_ports(ports: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PortsOutput { ports }),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["PORT"]);
            for port in ports {
                table.add_row(vec![port.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for port in ports {
                println!("{port}");
            }
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
