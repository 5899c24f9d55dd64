/// Errors that can occur on the serial line.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// The device could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: serialport::Error,
    },

    /// An I/O error occurred on an open line.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation needs an open line.
    #[error("line {0} is closed")]
    Closed(String),

    /// Serial port enumeration failed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(serialport::Error),
}

pub type Result<T> = std::result::Result<T, LineError>;
