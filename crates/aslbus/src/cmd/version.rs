use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("aslbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: aslbus");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("ASLBUS_BUILD_TARGET").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_tty: {}", asl_config::DEFAULT_TTY);
    println!("baud_rate: {}", asl_transport::DEFAULT_BAUD_RATE);
    println!("features: mock={}, cli=true", cfg!(feature = "mock"));

    Ok(SUCCESS)
}
