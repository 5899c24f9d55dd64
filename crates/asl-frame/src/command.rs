//! Reserved addresses, serials, and command codes.

/// Address used by the bus master (and for broadcasts).
pub const MASTER: char = '!';

/// Address probes answer from.
pub const PROBE: char = 'x';

/// Line artifact seen in the address slot; treated like a master echo.
pub const NOISE_ADDRESS: u8 = 0xC3;

/// Broadcast serial. Also the template for wildcard discovery serials.
pub const PING_SERIAL: &str = "ASL!!!!!!!!!!";

/// Character marking a serial as a broadcast; never valid in a probe serial.
pub const BROADCAST_MARKER: u8 = b'!';

/// Ping a probe; it answers with its own serial.
pub const PING: &str = "$0";

/// Let probes answer broadcast pings.
pub const ENABLE_PING: &str = "F0";

/// Stop a probe answering broadcast pings.
pub const DISABLE_PING: &str = "N0";

/// Request a reading (empty payload) or carry one (probe response).
pub const READING: &str = "r0";

/// Start-of-frame character.
pub const SOF: u8 = b':';

/// End-of-frame byte; the reader splits the stream on it.
pub const EOF: u8 = 0x04;

/// Sent ahead of every frame so the line settles before the start character.
pub const PREAMBLE: &str = "UU";

/// Returns a human-readable name for a command code.
pub fn command_name(command: &str) -> &'static str {
    match command {
        PING => "PING",
        ENABLE_PING => "ENABLE_PING",
        DISABLE_PING => "DISABLE_PING",
        READING => "READING",
        _ => "UNKNOWN",
    }
}

/// Returns true if the serial carries the broadcast marker.
pub fn is_broadcast_serial(serial: &str) -> bool {
    serial.as_bytes().contains(&BROADCAST_MARKER)
}
