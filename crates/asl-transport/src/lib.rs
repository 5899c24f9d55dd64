//! Serial line abstraction for the ASL bus.
//!
//! The bus runs over a half-duplex RS-485 line (19200 baud, 8 data bits,
//! 2 stop bits, no parity). This crate hides the concrete device behind two
//! small traits:
//! - [`Connector`] knows how to open the line
//! - [`Line`] is the opened byte stream (`Read + Write`)
//!
//! [`LinePort`] adds the open/closed bookkeeping that both bus halves need
//! to reconnect after failures.

pub mod error;
pub mod port;
pub mod serial;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{LineError, Result};
pub use port::LinePort;
pub use serial::{available_ports, SerialConnector, SerialSettings, DEFAULT_BAUD_RATE};
pub use traits::{Connector, Line};
