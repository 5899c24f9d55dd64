use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides the `--log-level` directives when set to a valid filter.
pub const LOG_ENV: &str = "ASLBUS_LOG";

/// Crates whose events follow `--log-level`; everything else is held at warn.
const BUS_TARGETS: [&str; 5] = ["aslbus", "asl_bus", "asl_frame", "asl_transport", "asl_config"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn others(self) -> LogLevel {
        match self {
            LogLevel::Error => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

/// Filter directives for `level`: bus crates at `level`, dependencies at warn.
pub fn default_directives(level: LogLevel) -> String {
    let mut directives = vec![level.others().as_str().to_string()];
    directives.extend(BUS_TARGETS.iter().map(|target| format!("{target}={}", level.as_str())));
    directives.join(",")
}

fn build_filter(level: LogLevel, env: Option<&str>) -> EnvFilter {
    if let Some(spec) = env.filter(|spec| !spec.trim().is_empty()) {
        match EnvFilter::try_new(spec) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("warning: ignoring {LOG_ENV}={spec:?}: {err}"),
        }
    }
    EnvFilter::new(default_directives(level))
}

/// Bus traffic logs go to stderr so stdout stays machine-readable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, env.as_deref()))
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
