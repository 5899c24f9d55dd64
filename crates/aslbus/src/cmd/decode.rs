use std::io::Read;

use asl_bus::Reading;
use asl_frame::decode_frame;

use crate::cmd::DecodeArgs;
use crate::exit::{bus_error, frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match args.frame {
        Some(text) => text.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };

    let frame = decode_frame(&text).map_err(|err| frame_error("decode failed", err))?;
    let reading = if frame.is_reading() {
        Some(Reading::decode(&frame.payload).map_err(|err| bus_error("decode failed", err))?)
    } else {
        None
    };

    print_frame(&frame, reading.as_ref(), format);
    Ok(SUCCESS)
}
