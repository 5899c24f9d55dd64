/// Errors that can occur on the bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Serial line error (open or write failure).
    #[error("line error: {0}")]
    Line(#[from] asl_transport::LineError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] asl_frame::FrameError),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A probe frame arrived for a serial with no registered probe.
    #[error("packet for unregistered probe: {0}")]
    UnregisteredProbe(String),

    /// A frame arrived from an address no device type answers on.
    #[error("packet from unsupported device ({0:?})")]
    UnsupportedDevice(char),

    /// A registered probe rejected a frame.
    #[error("failed to update probe {serial}: {source}")]
    ProbeUpdate {
        serial: String,
        #[source]
        source: Box<BusError>,
    },

    /// The probe has no transmit path bound.
    #[error("probe not attached to any bus")]
    NotAttached,

    /// The probe was detached and cannot be reused.
    #[error("probe {0} has been detached")]
    ProbeDetached(String),

    /// A reading frame that can't be decoded.
    #[error("malformed reading: {0}")]
    MalformedReading(String),

    /// `run` was called while the bus was already running.
    #[error("bus is already running")]
    AlreadyRunning,

    /// A scan needs the bus to be running.
    #[error("bus is not running")]
    BusNotRunning,

    /// A scan was started while another scan on the same scanner runs.
    #[error("a scan is already in progress")]
    ScanInProgress,

    /// Not every probe was found before the scan deadline.
    #[error("probe detection timed out")]
    ScanTimedOut,

    /// The scan was cancelled.
    #[error("probe detection cancelled")]
    ScanCancelled,

    /// A managed scan failed.
    #[error("scan failed ({found} found, {pinged} scanned): {source}")]
    ScanFailed {
        found: usize,
        pinged: usize,
        #[source]
        source: Box<BusError>,
    },
}

impl BusError {
    /// Short name of the error kind for logs and machine output.
    pub fn kind(&self) -> &'static str {
        match self {
            BusError::Line(_) => "line",
            BusError::Frame(_) => "frame",
            BusError::Spawn { .. } => "spawn",
            BusError::UnregisteredProbe(_) => "unregistered_probe",
            BusError::UnsupportedDevice(_) => "unsupported_device",
            BusError::ProbeUpdate { .. } => "probe_update",
            BusError::NotAttached => "not_attached",
            BusError::ProbeDetached(_) => "probe_detached",
            BusError::MalformedReading(_) => "malformed_reading",
            BusError::AlreadyRunning => "already_running",
            BusError::BusNotRunning => "bus_not_running",
            BusError::ScanInProgress => "scan_in_progress",
            BusError::ScanTimedOut => "scan_timed_out",
            BusError::ScanCancelled => "scan_cancelled",
            BusError::ScanFailed { .. } => "scan_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
