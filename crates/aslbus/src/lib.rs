//! ASL serial bus for fertigation rig EC probes.
//!
//! The bus is a half-duplex RS-485 line shared by a controller and any
//! number of EC/temperature probes. This crate re-exports each layer:
//!
//! - [`transport`]: serial line abstraction
//! - [`frame`]: frame codec, checksum, delimiter reader and writer
//! - [`config`]: rig configuration file and calibrations
//! - [`bus`]: transmitter, listener, probe registry, discovery, manager

/// Re-export transport types.
pub mod transport {
    pub use asl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use asl_frame::*;
}

/// Re-export configuration types.
pub mod config {
    pub use asl_config::*;
}

/// Re-export bus types.
pub mod bus {
    pub use asl_bus::*;
}
