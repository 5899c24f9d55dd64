//! Probe discovery.
//!
//! Probes answer pings addressed to their own serial, and to wildcard
//! serials whose trailing digits match theirs, until they are told to stop.
//! A scan enables pings on every probe, then sweeps wildcard serials of
//! growing width. Each newly heard probe is told to stop answering so the
//! rest can be found. Once a single probe is left the sweep gives way to a
//! plain broadcast ping.

use std::ops::Range;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use asl_frame::PING_SERIAL;
use crossbeam_channel::{after, bounded, never, select, tick, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::config::ScanConfig;
use crate::error::{BusError, Result};
use crate::state::{RunControl, RunState};

/// Widest wildcard mask the sweep tries.
pub const MAX_WILDCARD_WIDTH: usize = 5;

pub type DetectCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type DoneCallback = Arc<dyn Fn(&ScanOutcome) + Send + Sync>;

/// Result of one scan.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Every serial known at the end of the scan, registered ones included.
    pub serials: Vec<String>,
    /// Wildcard candidates pinged.
    pub pinged: usize,
    pub result: Result<()>,
}

impl ScanOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn wildcard_range(width: usize) -> Option<Range<u32>> {
    match width {
        1 => Some(0..10),
        2 => Some(10..100),
        3 => Some(100..999),
        4 => Some(1000..9999),
        5 => Some(10000..99999),
        _ => None,
    }
}

/// Candidate serials with the last `width` characters of the ping serial
/// replaced by digits. Empty for widths outside `1..=5`.
pub fn wildcard_serials(width: usize) -> impl Iterator<Item = String> {
    let prefix = &PING_SERIAL[..PING_SERIAL.len() - width.min(PING_SERIAL.len())];
    wildcard_range(width)
        .into_iter()
        .flatten()
        .map(move |n| format!("{prefix}{n:0width$}"))
}

/// Finds probes on a running bus.
pub struct Scanner {
    bus: Bus,
    count: usize,
    timeout: Duration,
    config: ScanConfig,
    serials: Arc<Mutex<Vec<String>>>,
    on_detect: RwLock<Option<DetectCallback>>,
    on_done: RwLock<Option<DoneCallback>>,
    control: RunControl,
}

impl Scanner {
    /// Scanner looking for `count` probes within `timeout`.
    pub fn new(bus: Bus, count: usize, timeout: Duration) -> Self {
        Self::with_config(bus, count, timeout, ScanConfig::default())
    }

    pub fn with_config(bus: Bus, count: usize, timeout: Duration, config: ScanConfig) -> Self {
        Self {
            bus,
            count,
            timeout,
            config,
            serials: Arc::new(Mutex::new(Vec::new())),
            on_detect: RwLock::new(None),
            on_done: RwLock::new(None),
            control: RunControl::new(),
        }
    }

    /// Called with each newly found serial, on the bus dispatch thread.
    pub fn on_detect(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_detect.write() = Some(Arc::new(cb));
    }

    /// Called once at the end of every scan with its outcome.
    pub fn on_done(&self, cb: impl Fn(&ScanOutcome) + Send + Sync + 'static) {
        *self.on_done.write() = Some(Arc::new(cb));
    }

    /// Serials known so far.
    pub fn serials(&self) -> Vec<String> {
        self.serials.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// Stop a running scan. Returns false if none was running.
    pub fn cancel(&self) -> bool {
        self.control.request_stop()
    }

    /// Run one scan to completion. Blocks.
    pub fn scan(&self) -> ScanOutcome {
        let outcome = self.run_scan();
        match &outcome.result {
            Ok(()) => info!(
                found = outcome.serials.len(),
                pinged = outcome.pinged,
                "scan complete"
            ),
            Err(err) => warn!(
                error = %err,
                found = outcome.serials.len(),
                pinged = outcome.pinged,
                "scan failed"
            ),
        }
        let done = self.on_done.read().clone();
        if let Some(cb) = done {
            cb(&outcome);
        }
        outcome
    }

    fn outcome(&self, pinged: usize, result: Result<()>) -> ScanOutcome {
        ScanOutcome {
            serials: self.serials(),
            pinged,
            result,
        }
    }

    fn remaining(serials: &Mutex<Vec<String>>, count: usize) -> usize {
        count.saturating_sub(serials.lock().len())
    }

    fn run_scan(&self) -> ScanOutcome {
        if !self.bus.is_running() {
            return self.outcome(0, Err(BusError::BusNotRunning));
        }
        let Some(guard) = self.control.begin() else {
            return self.outcome(0, Err(BusError::ScanInProgress));
        };

        *self.serials.lock() = self.bus.serials();
        if Self::remaining(&self.serials, self.count) == 0 {
            return self.outcome(0, Ok(()));
        }

        info!(
            target = self.count,
            known = self.serials.lock().len(),
            timeout = ?self.timeout,
            "scan starting"
        );
        let deadline = after(self.timeout);
        self.bus.enable_all_pings();

        let observer = {
            let serials = Arc::clone(&self.serials);
            let detect = self.on_detect.read().clone();
            let bus = self.bus.downgrade();
            self.bus.observe(move |frame| {
                {
                    let mut serials = serials.lock();
                    if serials.iter().any(|s| *s == frame.serial) {
                        return;
                    }
                    serials.push(frame.serial.clone());
                }
                info!(serial = %frame.serial, "probe detected");
                if let Some(cb) = &detect {
                    cb(&frame.serial);
                }
                if let Some(bus) = bus.upgrade() {
                    bus.disable_probe_ping(&frame.serial);
                }
            })
        };

        let (done_tx, done_rx) = bounded::<()>(0);
        let (candidates_tx, mut candidates) = bounded::<String>(0);
        let (last_man_tx, mut last_man) = bounded::<()>(1);

        let workers = match self.spawn_workers(&done_rx, candidates_tx, last_man_tx) {
            Ok(workers) => workers,
            Err(err) => {
                drop(done_tx);
                return self.outcome(0, Err(err));
            }
        };

        let mut pinged = 0;
        let mut last_man_logged = false;
        let result = loop {
            if Self::remaining(&self.serials, self.count) == 0 {
                break Ok(());
            }
            if guard.stop_requested() {
                break Err(BusError::ScanCancelled);
            }

            select! {
                recv(guard.cancelled()) -> _ => break Err(BusError::ScanCancelled),
                recv(deadline) -> _ => break Err(BusError::ScanTimedOut),
                recv(last_man) -> msg => match msg {
                    Ok(()) => {
                        if !last_man_logged {
                            info!("one probe left, pinging all");
                            last_man_logged = true;
                        }
                        self.bus.broadcast_ping();
                    }
                    Err(_) => last_man = never(),
                },
                recv(candidates) -> msg => match msg {
                    Ok(serial) => {
                        debug!(serial = %serial, "pinging candidate");
                        self.bus.ping(&serial);
                        pinged += 1;
                    }
                    Err(_) => candidates = never(),
                },
                default(self.config.poll) => {}
            }
        };

        drop(done_tx);
        for worker in workers {
            let _ = worker.join();
        }
        drop(observer);

        // Late detections may have landed between the last check and teardown.
        let result = match result {
            Err(_) if Self::remaining(&self.serials, self.count) == 0 => Ok(()),
            other => other,
        };
        self.outcome(pinged, result)
    }

    fn spawn_workers(
        &self,
        done: &Receiver<()>,
        candidates: Sender<String>,
        last_man: Sender<()>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut workers = Vec::with_capacity(3);

        let feeder = {
            let done = done.clone();
            let serials = Arc::clone(&self.serials);
            let count = self.count;
            let spacing = self.config.ping_spacing;
            move || {
                for width in 1..=MAX_WILDCARD_WIDTH {
                    debug!(width, "sweeping wildcard serials");
                    for serial in wildcard_serials(width) {
                        if Scanner::remaining(&serials, count) <= 1 {
                            debug!("sweep stopped, at most one probe left");
                            return;
                        }
                        select! {
                            send(candidates, serial) -> res => if res.is_err() { return },
                            recv(done) -> _ => return,
                        }
                        select! {
                            recv(done) -> _ => return,
                            default(spacing) => {}
                        }
                    }
                }
                debug!("sweep exhausted");
            }
        };
        workers.push(spawn("asl-scan-sweep", feeder)?);

        let rebroadcaster = {
            let done = done.clone();
            let serials = Arc::clone(&self.serials);
            let count = self.count;
            let bus = self.bus.clone();
            let ticker = tick(self.config.rebroadcast);
            move || loop {
                select! {
                    recv(done) -> _ => return,
                    recv(ticker) -> _ => {
                        if Scanner::remaining(&serials, count) > 1 {
                            bus.enable_all_pings();
                        }
                    }
                }
            }
        };
        workers.push(spawn("asl-scan-enable", rebroadcaster)?);

        let watcher = {
            let done = done.clone();
            let serials = Arc::clone(&self.serials);
            let count = self.count;
            let ticker = tick(self.config.last_man_interval);
            move || loop {
                select! {
                    recv(done) -> _ => return,
                    recv(ticker) -> _ => {
                        if Scanner::remaining(&serials, count) == 1 {
                            let _ = last_man.try_send(());
                        }
                    }
                }
            }
        };
        workers.push(spawn("asl-scan-last", watcher)?);

        Ok(workers)
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("count", &self.count)
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish()
    }
}

fn spawn<F>(name: &'static str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| BusError::Spawn { name, source })
}

/// Scan `bus` for `count` probes with default timing.
pub fn scan(bus: &Bus, count: usize, timeout: Duration) -> ScanOutcome {
    Scanner::new(bus.clone(), count, timeout).scan()
}
