use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use asl_bus::{Bus, Manager};
use asl_config::{CalibrationTable, MinderConfig, Translator};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, start_bus, stop_bus, MonitorArgs};
use crate::exit::{config_error, CliResult, SUCCESS};
use crate::output::{print_probe_rows, OutputFormat, ProbeRow};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.line.load_config()?;
    let tty = args.line.tty(&config);
    let interval = parse_duration(&args.interval)?;
    let calibrations = if args.calibrated {
        Some(
            config
                .calibration_table()
                .map_err(|err| config_error("invalid calibrations", err))?,
        )
    } else {
        None
    };
    let known = if args.serial.is_empty() {
        config.known_serials()
    } else {
        args.serial.clone()
    };

    let bus = Bus::new(&tty);
    let manager = Manager::new(bus.clone(), &known, config.scan_timeout());
    manager.on_error(|err| warn!(error = %err, "bus error"));
    manager.on_scan_done(|outcome| {
        info!(serials = ?outcome.serials, ok = outcome.is_ok(), "scan done")
    });

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let manager = manager.clone();
        install_ctrlc_handler(move || {
            running.store(false, Ordering::SeqCst);
            manager.shutdown();
        })?;
    }

    let handle = start_bus(&bus)?;
    info!(device = %tty, probes = ?known, "monitoring");

    let mut rounds = 0usize;
    while sleep_while_running(&running, interval) {
        let rows: Vec<ProbeRow> = manager
            .serials()
            .iter()
            .map(|serial| probe_row(&manager, &config, calibrations.as_ref(), serial))
            .collect();
        print_probe_rows(&rows, format);

        rounds = rounds.saturating_add(1);
        if args.count.is_some_and(|count| rounds >= count) {
            break;
        }
    }

    stop_bus(&bus, handle);
    Ok(SUCCESS)
}

fn role(config: &MinderConfig, serial: &str) -> &'static str {
    if serial == config.irrig_ec_probe {
        "irrig"
    } else if serial == config.runoff_ec_probe {
        "runoff"
    } else {
        "-"
    }
}

fn probe_row(
    manager: &Manager,
    config: &MinderConfig,
    calibrations: Option<&CalibrationTable>,
    serial: &str,
) -> ProbeRow {
    let (ec, temperature) = manager.probe_readings(serial);
    let role = role(config, serial);
    let mut row = ProbeRow::new(serial, role, ec, temperature);

    if let (Some(table), Some(ec)) = (calibrations, ec) {
        if role != "-" {
            match table.translate(&format!("{role}_ec"), ec) {
                Ok(value) => row.calibrated_ec = Some(value),
                Err(err) => warn!(serial, error = %err, "no calibration applied"),
            }
        }
    }
    row
}

/// Sleep for `total`, waking early if `running` clears. Returns whether
/// still running.
fn sleep_while_running(running: &AtomicBool, total: Duration) -> bool {
    let start = Instant::now();
    while running.load(Ordering::SeqCst) {
        let left = total.saturating_sub(start.elapsed());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(Duration::from_millis(100)));
    }
    false
}
