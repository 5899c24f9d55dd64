use asl_frame::encode_frame;

use crate::cmd::{validate_frame_fields, EncodeArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    validate_frame_fields(&args.serial, &args.command, &args.payload)?;
    let frame = encode_frame(args.address, &args.serial, &args.command, &args.payload);
    print_frame(&frame, None, format);
    Ok(SUCCESS)
}
