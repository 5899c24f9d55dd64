mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "aslbus", version, about = "ASL probe bus CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Log level for the bus crates (stderr). `ASLBUS_LOG` overrides it.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "aslbus",
            "send",
            "ASL1805180001",
            "$0",
            "--tty",
            "/dev/ttyUSB1",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.address, '!');
                assert_eq!(args.line.tty.as_deref(), Some("/dev/ttyUSB1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn save_requires_config() {
        let err = Cli::try_parse_from(["aslbus", "scan", "--save"])
            .expect_err("--save without --config should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_monitor_serial_list() {
        let cli = Cli::try_parse_from([
            "aslbus",
            "monitor",
            "--serial",
            "ASL1805180001,ASL1805180002",
            "--count",
            "3",
        ])
        .expect("monitor args should parse");
        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.serial, ["ASL1805180001", "ASL1805180002"]);
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
