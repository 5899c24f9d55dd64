//! Bus coordinator.
//!
//! A [`Bus`] owns the transmit queue and the frame listener for one line,
//! the probe registry and the callback table. [`Bus::run`] starts both
//! halves and dispatches received frames until [`Bus::shutdown`].

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use asl_frame::{
    decode_frame, Frame, DISABLE_PING, ENABLE_PING, MASTER, PING, PING_SERIAL, PROBE,
};
use asl_transport::{Connector, SerialConnector, SerialSettings};
use bytes::Bytes;
use crossbeam_channel::{select, unbounded, Receiver};
use tracing::{debug, info, warn};

use crate::callbacks::{Callbacks, ObserverHandle};
use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::master::Transmitter;
use crate::probe::Probe;
use crate::registry::ProbeRegistry;
use crate::slave::Listener;
use crate::state::{RunControl, RunState};

struct BusInner {
    name: String,
    config: BusConfig,
    transmitter: Arc<Transmitter>,
    listener: Arc<Listener>,
    registry: ProbeRegistry,
    callbacks: Arc<Callbacks>,
    control: RunControl,
}

/// Handle to an ASL bus. Clones share the same bus.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

/// Non-owning handle to a [`Bus`].
#[derive(Clone)]
pub struct WeakBus {
    inner: Weak<BusInner>,
}

impl WeakBus {
    pub fn upgrade(&self) -> Option<Bus> {
        self.inner.upgrade().map(|inner| Bus { inner })
    }
}

impl Bus {
    /// Bus on a serial device with default timing.
    pub fn new(tty: &str) -> Self {
        let config = BusConfig::default();
        let settings = SerialSettings::new(tty).with_read_timeout(config.read_timeout);
        Self::with_connector(Arc::new(SerialConnector::new(settings)), config)
    }

    /// Bus on any line.
    pub fn with_connector(connector: Arc<dyn Connector>, config: BusConfig) -> Self {
        let callbacks = Arc::new(Callbacks::new());
        let transmitter = Arc::new(Transmitter::new(Arc::clone(&connector), &config));
        {
            let callbacks = Arc::clone(&callbacks);
            transmitter.set_error_sink(Arc::new(move |err: BusError| callbacks.fire_error(&err)));
        }
        let listener = Arc::new(Listener::new(Arc::clone(&connector), &config));

        Self {
            inner: Arc::new(BusInner {
                name: connector.name(),
                config,
                transmitter,
                listener,
                registry: ProbeRegistry::new(),
                callbacks,
                control: RunControl::new(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Device name of the line.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn transmitter(&self) -> Arc<Transmitter> {
        Arc::clone(&self.inner.transmitter)
    }

    pub fn state(&self) -> RunState {
        self.inner.control.state()
    }

    pub fn is_running(&self) -> bool {
        self.inner.control.is_running()
    }

    /// Run the bus until [`shutdown`](Bus::shutdown). Blocks.
    ///
    /// Starts the transmitter and listener threads, fires the connect
    /// callback on its own thread, then decodes and dispatches every frame
    /// the listener delivers. A listener that dies is replaced after the
    /// attach backoff.
    pub fn run(&self) -> Result<()> {
        let guard = self.inner.control.begin().ok_or(BusError::AlreadyRunning)?;
        info!(device = %self.inner.name, "bus starting");

        let tx_handle = {
            let transmitter = Arc::clone(&self.inner.transmitter);
            let tx_guard = transmitter.begin().ok_or(BusError::AlreadyRunning)?;
            spawn("asl-tx", move || transmitter.run_guarded(tx_guard))?
        };
        let (mut rx, rx_handle) = match self.spawn_listener() {
            Ok(pair) => pair,
            Err(err) => {
                self.inner.transmitter.stop();
                let _ = tx_handle.join();
                return Err(err);
            }
        };

        if let Some(cb) = self.inner.callbacks.connect_callback() {
            if let Err(err) = spawn("asl-connect", move || cb()) {
                self.report_error(&err);
            }
        }
        info!(device = %self.inner.name, "bus connected");

        let mut rx_handle = Some(rx_handle);

        loop {
            select! {
                recv(guard.cancelled()) -> _ => break,
                recv(rx) -> msg => match msg {
                    Ok(raw) => self.handle_raw(&raw),
                    Err(_) => {
                        if guard.stop_requested() {
                            break;
                        }
                        warn!("listener channel closed, rebuilding reader");
                        if let Some(handle) = rx_handle.take() {
                            let _ = handle.join();
                        }
                        thread::sleep(self.inner.config.attach_backoff);
                        match self.spawn_listener() {
                            Ok((new_rx, new_handle)) => {
                                rx = new_rx;
                                rx_handle = Some(new_handle);
                            }
                            Err(err) => {
                                self.report_error(&err);
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.inner.listener.stop();
        self.inner.transmitter.stop();
        if let Some(handle) = rx_handle {
            let _ = handle.join();
        }
        let _ = tx_handle.join();
        info!(device = %self.inner.name, "bus stopped");
        Ok(())
    }

    fn spawn_listener(&self) -> Result<(Receiver<Bytes>, JoinHandle<()>)> {
        let (tx, rx) = unbounded();
        let listener = Arc::clone(&self.inner.listener);
        let guard = listener.begin().ok_or(BusError::AlreadyRunning)?;
        let handle = spawn("asl-rx", move || listener.run_guarded(guard, tx))?;
        Ok((rx, handle))
    }

    /// Stop the dispatch loop and both halves. Returns false if not running.
    pub fn shutdown(&self) -> bool {
        self.inner.control.request_stop()
    }

    fn handle_raw(&self, raw: &[u8]) {
        if let Err(err) = self.process_frame(raw) {
            warn!(error = %err, "processing packet failed");
            self.report_error(&err);
        }
    }

    /// Decode one raw frame and route it.
    ///
    /// Master echoes are ignored. Probe frames go to the matching probe and
    /// to every packet observer; the observers see the frame even when no
    /// probe is registered for it.
    pub fn process_frame(&self, raw: &[u8]) -> Result<()> {
        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(err) if err.is_benign() => {
                debug!("ignoring master frame");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if frame.address != PROBE {
            return Err(BusError::UnsupportedDevice(frame.address));
        }

        debug!(serial = %frame.serial, command = %frame.command, "probe frame received");
        let result = match self.inner.registry.find(&frame.serial) {
            Some(probe) => probe.update(&frame).map_err(|source| BusError::ProbeUpdate {
                serial: frame.serial.clone(),
                source: Box::new(source),
            }),
            None => Err(BusError::UnregisteredProbe(frame.serial.clone())),
        };
        self.inner.callbacks.notify_packet(&frame);
        result
    }

    pub(crate) fn report_error(&self, err: &BusError) {
        self.inner.callbacks.fire_error(err);
    }

    /// Queue a frame for transmission.
    pub fn transmit(&self, address: char, serial: &str, command: &str, payload: &str) -> bool {
        self.inner
            .transmitter
            .transmit_packet(address, serial, command, payload)
    }

    /// Let every probe answer broadcast pings.
    pub fn enable_all_pings(&self) {
        info!("enable all pings");
        self.transmit(MASTER, PING_SERIAL, ENABLE_PING, "");
    }

    /// Stop every probe answering broadcast pings.
    pub fn disable_all_pings(&self) {
        info!("disable all pings");
        self.transmit(MASTER, PING_SERIAL, DISABLE_PING, "");
    }

    /// Stop one probe answering broadcast pings.
    pub fn disable_probe_ping(&self, serial: &str) {
        info!(serial, "disable ping");
        self.transmit(MASTER, serial, DISABLE_PING, "");
    }

    /// Ping every probe that still has pings enabled.
    pub fn broadcast_ping(&self) {
        self.transmit(MASTER, PING_SERIAL, PING, "");
    }

    /// Ping one serial (or wildcard serial).
    pub fn ping(&self, serial: &str) {
        self.transmit(MASTER, serial, PING, "");
    }

    pub fn register_probe(&self, probe: Arc<dyn Probe>) -> bool {
        self.inner.registry.register(probe)
    }

    pub fn unregister_probe(&self, serial: &str) -> bool {
        self.inner.registry.unregister(serial)
    }

    pub fn has_probe(&self, serial: &str) -> bool {
        self.inner.registry.contains(serial)
    }

    pub fn find_probe(&self, serial: &str) -> Option<Arc<dyn Probe>> {
        self.inner.registry.find(serial)
    }

    pub fn serials(&self) -> Vec<String> {
        self.inner.registry.serials()
    }

    pub fn probes(&self) -> Vec<Arc<dyn Probe>> {
        self.inner.registry.all()
    }

    /// Detach every probe, empty the registry, then fire the cleared callback.
    pub fn clear_probes(&self) {
        for probe in self.inner.registry.all() {
            probe.detach();
        }
        let leftover = self.inner.registry.take_all();
        if !leftover.is_empty() {
            debug!(count = leftover.len(), "dropped probes that stayed registered after detach");
        }
        info!("probes cleared");
        self.inner.callbacks.fire_cleared();
    }

    pub fn on_error(&self, cb: impl Fn(&BusError) + Send + Sync + 'static) {
        self.inner.callbacks.set_error(Arc::new(cb));
    }

    /// Called once per [`run`](Bus::run), on its own thread, after both
    /// halves start.
    pub fn on_connect(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.inner.callbacks.set_connect(Arc::new(cb));
    }

    pub fn on_probes_cleared(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.inner.callbacks.set_cleared(Arc::new(cb));
    }

    /// Register a packet observer. Observers run on the dispatch thread and
    /// must not block.
    pub fn on_packet(&self, cb: impl Fn(&Frame) + Send + Sync + 'static) -> ObserverHandle {
        self.inner.callbacks.add_packet(Arc::new(cb))
    }

    pub fn unregister_on_packet(&self, handle: ObserverHandle) -> bool {
        self.inner.callbacks.remove_packet(handle)
    }

    /// Live packet observers.
    pub fn packet_observers(&self) -> usize {
        self.inner.callbacks.packet_observers()
    }

    /// Register a packet observer that is removed when the guard drops.
    pub fn observe(&self, cb: impl Fn(&Frame) + Send + Sync + 'static) -> ObserverGuard {
        ObserverGuard {
            callbacks: Arc::clone(&self.inner.callbacks),
            handle: self.on_packet(cb),
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("device", &self.inner.name)
            .field("state", &self.state())
            .field("probes", &self.serials())
            .finish()
    }
}

/// Removes its packet observer on drop.
pub struct ObserverGuard {
    callbacks: Arc<Callbacks>,
    handle: ObserverHandle,
}

impl ObserverGuard {
    pub fn handle(&self) -> ObserverHandle {
        self.handle
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.callbacks.remove_packet(self.handle);
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
