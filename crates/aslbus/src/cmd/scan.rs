use std::sync::Arc;

use asl_bus::{Bus, Scanner};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, start_bus, stop_bus, ScanArgs};
use crate::exit::{bus_error, config_error, CliResult, SUCCESS};
use crate::output::{print_scan, OutputFormat};

pub fn run(args: ScanArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = args.line.load_config()?;
    let tty = args.line.tty(&config);
    let timeout = match &args.timeout {
        Some(timeout) => parse_duration(timeout)?,
        None => config.scan_timeout(),
    };

    let bus = Bus::new(&tty);
    bus.on_error(|err| warn!(error = %err, "bus error"));
    let handle = start_bus(&bus)?;

    let scanner = Arc::new(Scanner::new(bus.clone(), args.count, timeout));
    scanner.on_detect(|serial| info!(serial, "probe detected"));
    {
        let scanner = Arc::clone(&scanner);
        install_ctrlc_handler(move || {
            scanner.cancel();
        })?;
    }

    info!(device = %tty, count = args.count, timeout = ?timeout, "scanning");
    let outcome = scanner.scan();
    stop_bus(&bus, handle);
    print_scan(&tty, &outcome, format);

    if let Err(err) = outcome.result {
        return Err(bus_error("scan failed", err));
    }

    if args.save {
        if let Some(path) = &args.line.config {
            config.assign_probe_serials(&outcome.serials);
            config
                .save_to(path)
                .map_err(|err| config_error("config save failed", err))?;
            info!(
                path = %path.display(),
                irrig = %config.irrig_ec_probe,
                runoff = %config.runoff_ec_probe,
                "probe serials saved"
            );
        }
    }

    Ok(SUCCESS)
}
