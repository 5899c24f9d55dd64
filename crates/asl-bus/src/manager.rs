//! Ties a bus, a scanner and the EC probes together.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bus::Bus;
use crate::config::{ProbeConfig, ScanConfig};
use crate::error::{BusError, Result};
use crate::probe::EcProbe;
use crate::scanner::{ScanOutcome, Scanner};

/// Probes a rig carries: one on the irrigation line, one on the runoff.
pub const TARGET_PROBE_COUNT: usize = 2;

struct ManagerInner {
    bus: Bus,
    scanner: Scanner,
    probe_config: ProbeConfig,
    known: Mutex<Vec<String>>,
    last_scan_started: Mutex<Option<SystemTime>>,
    last_scan_finished: Mutex<Option<SystemTime>>,
}

/// Bus lifecycle manager.
///
/// When the bus connects, scans if fewer than [`TARGET_PROBE_COUNT`] serials
/// are known, then attaches an [`EcProbe`] for every serial.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    pub fn new(bus: Bus, known: &[String], scan_timeout: Duration) -> Self {
        Self::with_config(
            bus,
            known,
            scan_timeout,
            ProbeConfig::default(),
            ScanConfig::default(),
        )
    }

    pub fn with_config(
        bus: Bus,
        known: &[String],
        scan_timeout: Duration,
        probe_config: ProbeConfig,
        scan_config: ScanConfig,
    ) -> Self {
        let known: Vec<String> = known.iter().filter(|s| !s.is_empty()).cloned().collect();
        info!(count = known.len(), serials = ?known, "known probes");

        let scanner =
            Scanner::with_config(bus.clone(), TARGET_PROBE_COUNT, scan_timeout, scan_config);
        scanner.on_detect(|serial| info!(serial, "detected new probe"));

        let manager = Self {
            inner: Arc::new(ManagerInner {
                bus,
                scanner,
                probe_config,
                known: Mutex::new(known),
                last_scan_started: Mutex::new(None),
                last_scan_finished: Mutex::new(None),
            }),
        };

        let weak: Weak<ManagerInner> = Arc::downgrade(&manager.inner);
        manager.inner.bus.on_connect(move || {
            if let Some(inner) = weak.upgrade() {
                Manager { inner }.on_connected();
            }
        });
        manager
    }

    fn on_connected(&self) {
        let known = self.inner.known.lock().clone();
        self.attach_all(&known);
        if self.inner.bus.serials().len() < TARGET_PROBE_COUNT {
            let outcome = self.scan();
            self.attach_all(&outcome.serials);
        }
    }

    fn attach_all(&self, serials: &[String]) {
        for serial in serials {
            if let Err(err) = self.attach_probe(serial) {
                warn!(serial = %serial, error = %err, "failed to attach probe");
                self.inner.bus.report_error(&err);
            }
        }
    }

    /// Attach an EC probe for `serial` unless one is already registered.
    pub fn attach_probe(&self, serial: &str) -> Result<()> {
        if self.inner.bus.has_probe(serial) {
            return Ok(());
        }
        info!(serial, "attaching ec probe");
        EcProbe::with_config(serial, self.inner.probe_config.clone()).attach(&self.inner.bus)?;
        let mut known = self.inner.known.lock();
        if !known.iter().any(|s| s == serial) {
            known.push(serial.to_string());
        }
        Ok(())
    }

    /// Run the bus. Blocks until it is shut down.
    pub fn run(&self) -> Result<()> {
        self.inner.bus.run()
    }

    /// Stop the bus and detach its probes. Known serials are kept, so the
    /// next connect attaches them again.
    pub fn shutdown(&self) -> bool {
        self.inner.scanner.cancel();
        let stopped = self.inner.bus.shutdown();
        self.inner.bus.clear_probes();
        stopped
    }

    /// Scan the bus. A failure comes back as [`BusError::ScanFailed`] and
    /// is also reported to the bus error callback.
    pub fn scan(&self) -> ScanOutcome {
        *self.inner.last_scan_started.lock() = Some(SystemTime::now());
        info!("starting a bus scan");
        let ScanOutcome {
            serials,
            pinged,
            result,
        } = self.inner.scanner.scan();
        *self.inner.last_scan_finished.lock() = Some(SystemTime::now());

        let result = result.map_err(|source| BusError::ScanFailed {
            found: serials.len(),
            pinged,
            source: Box::new(source),
        });
        if let Err(err) = &result {
            self.inner.bus.report_error(err);
        }
        ScanOutcome {
            serials,
            pinged,
            result,
        }
    }

    /// Detach every probe, scan, then attach what was found.
    pub fn rescan(&self) -> ScanOutcome {
        self.inner.bus.clear_probes();
        let outcome = self.scan();
        self.attach_all(&outcome.serials);
        outcome
    }

    /// EC and temperature for `serial`, `None` unless the probe is attached
    /// and fresh.
    pub fn probe_readings(&self, serial: &str) -> (Option<f64>, Option<f64>) {
        match self.inner.bus.find_probe(serial) {
            Some(probe) if probe.is_valid() => (Some(probe.ec()), Some(probe.temperature())),
            _ => (None, None),
        }
    }

    /// Serials of the probes on the bus.
    pub fn serials(&self) -> Vec<String> {
        self.inner.bus.serials()
    }

    /// Serials configured or attached so far.
    pub fn known_serials(&self) -> Vec<String> {
        self.inner.known.lock().clone()
    }

    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    pub fn last_scan_started(&self) -> Option<SystemTime> {
        *self.inner.last_scan_started.lock()
    }

    pub fn last_scan_finished(&self) -> Option<SystemTime> {
        *self.inner.last_scan_finished.lock()
    }

    pub fn on_error(&self, cb: impl Fn(&BusError) + Send + Sync + 'static) {
        self.inner.bus.on_error(cb);
    }

    pub fn on_scan_done(&self, cb: impl Fn(&ScanOutcome) + Send + Sync + 'static) {
        self.inner.scanner.on_done(cb);
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("bus", &self.inner.bus)
            .field("known", &*self.inner.known.lock())
            .finish()
    }
}
