//! EC probes.
//!
//! An [`EcProbe`] moves through `Unattached → Attached → Detached`. While
//! attached it asks for a reading every poll interval and keeps the last
//! decoded [`Reading`] along with the time the probe was last heard from.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::SystemTime;

use asl_frame::{Frame, DISABLE_PING, ENABLE_PING, PROBE, READING};
use crossbeam_channel::{select, tick};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bus::{Bus, WeakBus};
use crate::config::ProbeConfig;
use crate::error::{BusError, Result};
use crate::master::Transmitter;
use crate::reading::Reading;
use crate::state::{RunControl, RunGuard};

/// A device the bus can route frames to.
///
/// `update` runs on the bus dispatch thread and must not block.
pub trait Probe: Send + Sync {
    fn serial(&self) -> &str;

    /// Handle a frame addressed to this probe.
    fn update(&self, frame: &Frame) -> Result<()>;

    /// Stop any background work and leave the bus.
    fn detach(&self);

    /// Whether the probe has been heard from recently enough to trust.
    fn is_valid(&self) -> bool;

    fn ec(&self) -> f64;

    fn temperature(&self) -> f64;
}

/// Attachment state of an [`EcProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unattached,
    Attached,
    Detached,
}

struct ProbeInner {
    state: ProbeState,
    bus: Option<WeakBus>,
    transmitter: Option<Arc<Transmitter>>,
    last_seen: Option<SystemTime>,
    reading: Option<Reading>,
}

/// Electrical-conductivity and temperature probe.
pub struct EcProbe {
    serial: String,
    config: ProbeConfig,
    poll: RunControl,
    inner: Mutex<ProbeInner>,
}

impl EcProbe {
    pub fn new(serial: impl Into<String>) -> Arc<Self> {
        Self::with_config(serial, ProbeConfig::default())
    }

    pub fn with_config(serial: impl Into<String>, config: ProbeConfig) -> Arc<Self> {
        Arc::new(Self {
            serial: serial.into(),
            config,
            poll: RunControl::new(),
            inner: Mutex::new(ProbeInner {
                state: ProbeState::Unattached,
                bus: None,
                transmitter: None,
                last_seen: None,
                reading: None,
            }),
        })
    }

    pub fn state(&self) -> ProbeState {
        self.inner.lock().state
    }

    /// Bind to a bus, start polling and register. Attaching twice is a no-op;
    /// a detached probe can't be reattached.
    pub fn attach(self: &Arc<Self>, bus: &Bus) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ProbeState::Detached => return Err(BusError::ProbeDetached(self.serial.clone())),
                ProbeState::Attached => return Ok(()),
                ProbeState::Unattached => {}
            }
            inner.bus = Some(bus.downgrade());
            inner.transmitter = Some(bus.transmitter());
            inner.state = ProbeState::Attached;
        }

        if let Some(guard) = self.poll.begin() {
            let probe = Arc::downgrade(self);
            let interval = self.config.poll_interval;
            let spawned = thread::Builder::new()
                .name(format!("asl-probe-{}", self.serial))
                .spawn(move || poll_loop(probe, guard, interval));
            if let Err(source) = spawned {
                return Err(BusError::Spawn {
                    name: "probe poll",
                    source,
                });
            }
        }

        let probe: Arc<dyn Probe> = Arc::clone(self) as Arc<dyn Probe>;
        bus.register_probe(probe);
        info!(serial = %self.serial, "probe attached");
        Ok(())
    }

    /// Queue a reading request for this probe.
    pub fn request_reading(&self) -> Result<()> {
        self.send(READING)
    }

    /// Let this probe answer broadcast pings.
    pub fn enable_pings(&self) -> Result<()> {
        self.send(ENABLE_PING)
    }

    /// Stop this probe answering broadcast pings.
    pub fn disable_pings(&self) -> Result<()> {
        self.send(DISABLE_PING)
    }

    fn send(&self, command: &str) -> Result<()> {
        let transmitter = self
            .inner
            .lock()
            .transmitter
            .clone()
            .ok_or(BusError::NotAttached)?;
        transmitter.transmit_packet(PROBE, &self.serial, command, "");
        Ok(())
    }

    /// The last decoded reading, if any.
    pub fn reading(&self) -> Option<Reading> {
        self.inner.lock().reading.clone()
    }

    pub fn last_seen(&self) -> Option<SystemTime> {
        self.inner.lock().last_seen
    }

    pub fn firmware_version(&self) -> Option<String> {
        self.inner.lock().reading.as_ref().map(|r| r.firmware_version.clone())
    }

    /// Freshness relative to `now`. A last-seen time ahead of `now` counts
    /// as fresh.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        let Some(last_seen) = self.last_seen() else {
            return false;
        };
        match now.duration_since(last_seen) {
            Ok(age) => age <= self.config.freshness,
            Err(_) => true,
        }
    }

    /// One poll tick: ask for a reading while the bus runs. A stopped bus
    /// drains nothing, so requests would only pile up in its queue.
    fn poll(&self) {
        let bus = self.inner.lock().bus.as_ref().and_then(WeakBus::upgrade);
        if let Some(bus) = &bus {
            if !bus.is_running() {
                debug!(serial = %self.serial, "bus not running, reading request skipped");
                return;
            }
        }
        if let Err(err) = self.request_reading() {
            self.report(&err);
        }
    }

    fn report(&self, err: &BusError) {
        let bus = self.inner.lock().bus.clone();
        match bus.and_then(|b| b.upgrade()) {
            Some(bus) => bus.report_error(err),
            None => warn!(serial = %self.serial, error = %err, "probe error with no bus"),
        }
    }
}

fn poll_loop(probe: Weak<EcProbe>, guard: RunGuard, interval: std::time::Duration) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(guard.cancelled()) -> _ => break,
            recv(ticker) -> _ => {
                let Some(probe) = probe.upgrade() else { break };
                probe.poll();
            }
        }
    }
    debug!("probe polling stopped");
}

impl Probe for EcProbe {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn update(&self, frame: &Frame) -> Result<()> {
        if frame.serial != self.serial {
            warn!(serial = %self.serial, got = %frame.serial, "frame for another probe ignored");
            return Ok(());
        }

        let mut inner = self.inner.lock();
        inner.last_seen = Some(frame.timestamp);

        if frame.command == READING {
            if frame.payload.is_empty() {
                return Err(BusError::MalformedReading("readings packet contains no data".into()));
            }
            let reading = Reading::decode(&frame.payload)?;
            debug!(
                serial = %self.serial,
                ec = reading.ec,
                temperature = reading.temperature,
                "reading"
            );
            inner.reading = Some(reading);
        }
        Ok(())
    }

    fn detach(&self) {
        self.poll.request_stop();
        while self.poll.is_active() {
            thread::sleep(self.config.detach_poll);
        }

        let bus = {
            let mut inner = self.inner.lock();
            inner.state = ProbeState::Detached;
            inner.transmitter = None;
            inner.bus.take()
        };
        if let Some(bus) = bus.and_then(|b| b.upgrade()) {
            bus.unregister_probe(&self.serial);
        }
        info!(serial = %self.serial, "probe detached");
    }

    fn is_valid(&self) -> bool {
        self.is_valid_at(SystemTime::now())
    }

    fn ec(&self) -> f64 {
        self.inner.lock().reading.as_ref().map_or(0.0, |r| r.ec)
    }

    fn temperature(&self) -> f64 {
        self.inner.lock().reading.as_ref().map_or(0.0, |r| r.temperature)
    }
}

impl std::fmt::Debug for EcProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcProbe")
            .field("serial", &self.serial)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use asl_frame::{encode_frame, PING};
    use asl_transport::mock::MemoryConnector;

    use super::*;
    use crate::bus::tests::{fast_config, wait_until, TestBus};

    /// Probe double that counts updates.
    pub struct FakeProbe {
        serial: String,
        fail: bool,
        updates: AtomicUsize,
        detached: AtomicBool,
    }

    impl FakeProbe {
        pub fn new(serial: &str) -> Self {
            Self {
                serial: serial.to_string(),
                fail: false,
                updates: AtomicUsize::new(0),
                detached: AtomicBool::new(false),
            }
        }

        pub fn failing(serial: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(serial)
            }
        }

        pub fn updates(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }

        pub fn detached(&self) -> bool {
            self.detached.load(Ordering::SeqCst)
        }
    }

    impl Probe for FakeProbe {
        fn serial(&self) -> &str {
            &self.serial
        }

        fn update(&self, _frame: &Frame) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BusError::MalformedReading("fake".into()));
            }
            Ok(())
        }

        fn detach(&self) {
            self.detached.store(true, Ordering::SeqCst);
        }

        fn is_valid(&self) -> bool {
            true
        }

        fn ec(&self) -> f64 {
            0.0
        }

        fn temperature(&self) -> f64 {
            0.0
        }
    }

    const SERIAL: &str = "ASL1805180000";
    const READING_FRAME: &str = ":xASL1805180000r0400000000301010101011501F609\
        000000000000000000000000000000000000000000000000000000000000000000000000000000000000\
        83445587834455870001AAB6";

    fn quick() -> ProbeConfig {
        ProbeConfig {
            poll_interval: Duration::from_millis(10),
            detach_poll: Duration::from_millis(2),
            ..ProbeConfig::default()
        }
    }

    fn seen_ago(probe: &EcProbe, secs: u64) -> SystemTime {
        let now = SystemTime::now();
        let mut frame = encode_frame(PROBE, SERIAL, PING, "");
        frame.timestamp = now - Duration::from_secs(secs);
        probe.update(&frame).unwrap();
        now
    }

    #[test]
    fn decodes_reading_frame() {
        let probe = EcProbe::new(SERIAL);
        let frame = asl_frame::decode_frame(READING_FRAME).unwrap();

        probe.update(&frame).unwrap();

        let reading = probe.reading().unwrap();
        assert_eq!(reading.firmware_version, "V2.59");
        assert!((probe.ec() - 2.77).abs() < 1e-9);
        assert!((probe.temperature() - 25.5).abs() < 1e-9);
        assert_eq!(reading.ec_real, 2_270_512_259.0);
        assert_eq!(reading.signal, 1);
        assert_eq!(probe.last_seen(), Some(frame.timestamp));
    }

    #[test]
    fn empty_reading_is_malformed() {
        let probe = EcProbe::new(SERIAL);
        let frame = encode_frame(PROBE, SERIAL, READING, "");

        assert!(matches!(probe.update(&frame), Err(BusError::MalformedReading(_))));
        assert!(probe.last_seen().is_some());
        assert!(probe.reading().is_none());
    }

    #[test]
    fn other_serial_is_ignored() {
        let probe = EcProbe::new(SERIAL);
        let frame = encode_frame(PROBE, "ASL1805180001", PING, "");

        probe.update(&frame).unwrap();
        assert!(probe.last_seen().is_none());
    }

    #[test]
    fn freshness_window() {
        let probe = EcProbe::new(SERIAL);
        assert!(!probe.is_valid());

        let now = seen_ago(&probe, 119);
        assert!(probe.is_valid_at(now));

        let now = seen_ago(&probe, 121);
        assert!(!probe.is_valid_at(now));

        let now = seen_ago(&probe, 120);
        assert!(probe.is_valid_at(now));
    }

    #[test]
    fn unattached_probe_cannot_send() {
        let probe = EcProbe::new(SERIAL);
        assert!(matches!(probe.request_reading(), Err(BusError::NotAttached)));
        assert!(matches!(probe.enable_pings(), Err(BusError::NotAttached)));
    }

    #[test]
    fn attach_polls_and_detach_unregisters() {
        let test_bus = TestBus::start();
        let bus = &test_bus.bus;
        let probe = EcProbe::with_config(SERIAL, quick());

        probe.attach(bus).unwrap();
        probe.attach(bus).unwrap();
        assert_eq!(probe.state(), ProbeState::Attached);
        assert_eq!(bus.serials(), vec![SERIAL.to_string()]);

        let tx = bus.transmitter();
        assert!(wait_until(Duration::from_secs(2), || tx.requests() >= 2));

        probe.detach();
        assert_eq!(probe.state(), ProbeState::Detached);
        assert!(!bus.has_probe(SERIAL));
        let after = tx.requests();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(tx.requests(), after);

        assert!(matches!(probe.attach(bus), Err(BusError::ProbeDetached(_))));
    }

    #[test]
    fn polling_pauses_while_bus_is_stopped() {
        let idle = Bus::with_connector(Arc::new(MemoryConnector::new()), fast_config());
        let probe = EcProbe::with_config(SERIAL, quick());
        probe.attach(&idle).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(idle.transmitter().requests(), 0);
        probe.detach();

        let test_bus = TestBus::start();
        let bus = test_bus.bus.clone();
        let tx = bus.transmitter();
        let probe = EcProbe::with_config(SERIAL, quick());
        probe.attach(&bus).unwrap();
        assert!(wait_until(Duration::from_secs(2), || tx.requests() >= 2));

        test_bus.stop().unwrap();
        assert_eq!(probe.state(), ProbeState::Attached);
        thread::sleep(Duration::from_millis(30));
        let requests = tx.requests();
        let queued = tx.queue_len();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(tx.requests(), requests);
        assert_eq!(tx.queue_len(), queued);

        probe.detach();
    }

    #[test]
    fn reading_requests_reach_the_line() {
        let test_bus = TestBus::start();
        let probe = EcProbe::with_config(SERIAL, quick());
        probe.attach(&test_bus.bus).unwrap();

        let request = encode_frame(PROBE, SERIAL, READING, "").raw;
        assert!(wait_until(Duration::from_secs(2), || {
            test_bus.written_text().contains(&request)
        }));

        test_bus.line.inject(format!("UU{READING_FRAME}\u{4}").into_bytes());
        assert!(wait_until(Duration::from_secs(2), || probe.reading().is_some()));
        assert!(probe.is_valid());

        test_bus.bus.clear_probes();
        assert_eq!(probe.state(), ProbeState::Detached);
        test_bus.stop().unwrap();
    }
}
