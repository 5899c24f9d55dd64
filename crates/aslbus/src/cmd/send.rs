use std::sync::Arc;

use asl_bus::{BusConfig, Transmitter};
use asl_frame::encode_frame;
use asl_transport::{SerialConnector, SerialSettings};
use tracing::info;

use crate::cmd::{validate_frame_fields, SendArgs};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    validate_frame_fields(&args.serial, &args.command, &args.payload)?;
    let config = args.line.load_config()?;
    let tty = args.line.tty(&config);

    let bus_config = BusConfig::default();
    let settings = SerialSettings::new(tty.clone()).with_read_timeout(bus_config.read_timeout);
    let transmitter = Transmitter::new(Arc::new(SerialConnector::new(settings)), &bus_config);

    let frame = encode_frame(args.address, &args.serial, &args.command, &args.payload);
    let written = transmitter
        .transmit(&frame)
        .map_err(|err| bus_error("send failed", err))?;
    info!(device = %tty, bytes = written, "frame sent");

    print_frame(&frame, None, format);
    Ok(SUCCESS)
}
