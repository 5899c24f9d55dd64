//! ASL bus coordination.
//!
//! A [`Bus`] pairs a paced [`Transmitter`] (the master half) with a
//! [`Listener`] (the slave half) on one serial line, decodes what the
//! listener hears and routes probe frames to registered [`Probe`]s and
//! packet observers. [`Scanner`] finds unknown probes on the line and
//! [`Manager`] ties scanning and probe attachment to bus connection.

pub mod bus;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod manager;
pub mod master;
pub mod probe;
pub mod reading;
pub mod registry;
pub mod scanner;
pub mod slave;
pub mod state;

pub use bus::{Bus, ObserverGuard, WeakBus};
pub use callbacks::ObserverHandle;
pub use config::{BusConfig, ProbeConfig, ScanConfig};
pub use error::{BusError, Result};
pub use manager::{Manager, TARGET_PROBE_COUNT};
pub use master::Transmitter;
pub use probe::{EcProbe, Probe, ProbeState};
pub use reading::{Reading, READING_PAYLOAD_LEN};
pub use registry::ProbeRegistry;
pub use scanner::{scan, wildcard_serials, ScanOutcome, Scanner, MAX_WILDCARD_WIDTH};
pub use slave::Listener;
pub use state::{RunControl, RunGuard, RunState};
