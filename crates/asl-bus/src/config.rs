use std::time::Duration;

use asl_frame::DEFAULT_FIFO_CAPACITY;

/// Timing and sizing for a bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Interval between transmitted frames; one frame goes out per tick.
    pub transmit_tick: Duration,
    /// Interval between reader reconnect attempts.
    pub receive_tick: Duration,
    /// Frames the transmit queue holds before refusing more.
    pub queue_capacity: usize,
    /// How long a line read may block.
    pub read_timeout: Duration,
    /// Pause before rebuilding a failed reader.
    pub attach_backoff: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transmit_tick: Duration::from_secs(1),
            receive_tick: Duration::from_secs(1),
            queue_capacity: DEFAULT_FIFO_CAPACITY,
            read_timeout: Duration::from_secs(2),
            attach_backoff: Duration::from_millis(500),
        }
    }
}

/// Timing for an attached probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Interval between reading requests.
    pub poll_interval: Duration,
    /// Interval between checks while waiting for polling to stop.
    pub detach_poll: Duration,
    /// How long after the last frame a probe's values stay usable.
    pub freshness: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            detach_poll: Duration::from_millis(100),
            freshness: Duration::from_secs(120),
        }
    }
}

/// Timing for a discovery scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Gap between wildcard candidate pings.
    pub ping_spacing: Duration,
    /// Interval between "enable all pings" re-broadcasts.
    pub rebroadcast: Duration,
    /// Interval between global pings once one probe is left.
    pub last_man_interval: Duration,
    /// How often the scan checks for completion or cancellation.
    pub poll: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ping_spacing: Duration::from_secs(1),
            rebroadcast: Duration::from_secs(10),
            last_man_interval: Duration::from_secs(1),
            poll: Duration::from_millis(50),
        }
    }
}
