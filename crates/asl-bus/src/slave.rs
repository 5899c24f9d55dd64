//! Frame listener: the slave half of the bus.

use std::io::ErrorKind;
use std::sync::Arc;

use asl_frame::{FrameError, FrameReader};
use asl_transport::{Connector, LinePort};
use bytes::Bytes;
use crossbeam_channel::{select, tick, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::state::{RunControl, RunGuard, RunState};

/// Reads delimited frames off the line and forwards the raw bytes.
pub struct Listener {
    reader: Mutex<FrameReader<LinePort>>,
    control: RunControl,
    config: BusConfig,
}

fn is_timeout(err: &FrameError) -> bool {
    matches!(
        err,
        FrameError::Io(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
    )
}

impl Listener {
    pub fn new(connector: Arc<dyn Connector>, config: &BusConfig) -> Self {
        Self {
            reader: Mutex::new(FrameReader::new(LinePort::new(connector))),
            control: RunControl::new(),
            config: config.clone(),
        }
    }

    /// Read frames into `out` until stopped. Blocks.
    ///
    /// On each tick a closed line is reopened (a failed open just waits for
    /// the next tick). Any read error drops the partial frame; a timeout
    /// keeps the line open, anything else closes it. The line is always
    /// closed on return.
    pub fn run(&self, out: Sender<Bytes>) {
        match self.begin() {
            Some(guard) => self.run_guarded(guard, out),
            None => warn!("listener already running"),
        }
    }

    /// Claim the run state ahead of [`run_guarded`](Self::run_guarded).
    pub fn begin(&self) -> Option<RunGuard> {
        self.control.begin()
    }

    /// The run loop, for a run already claimed with [`begin`](Self::begin).
    pub fn run_guarded(&self, guard: RunGuard, out: Sender<Bytes>) {
        let ticker = tick(self.config.receive_tick);
        let mut reader = self.reader.lock();
        info!(device = %reader.get_ref().name(), "listener started");

        'ticks: loop {
            select! {
                recv(guard.cancelled()) -> _ => break,
                recv(ticker) -> _ => {}
            }

            if reader.get_ref().is_closed() {
                if let Err(err) = reader.get_mut().open() {
                    debug!(error = %err, "line open failed, retrying next tick");
                    continue;
                }
            }

            loop {
                if guard.stop_requested() {
                    break 'ticks;
                }

                match reader.read_raw() {
                    Ok(raw) => {
                        debug!(bytes = raw.len(), "frame read");
                        if out.send(raw).is_err() {
                            debug!("frame consumer gone");
                            break 'ticks;
                        }
                    }
                    Err(err) => {
                        reader.reset();
                        if !is_timeout(&err) {
                            warn!(error = %err, "read failed, closing line");
                            reader.get_mut().close();
                        }
                        break;
                    }
                }
            }
        }

        reader.reset();
        reader.get_mut().close();
        info!("listener stopped");
    }

    /// Stop the run loop at the next read boundary.
    pub fn stop(&self) -> bool {
        self.control.request_stop()
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use asl_frame::{encode_frame, PING, PROBE};
    use asl_transport::mock::MemoryConnector;
    use crossbeam_channel::unbounded;

    use super::*;

    fn fast_config() -> BusConfig {
        BusConfig {
            receive_tick: Duration::from_millis(5),
            ..BusConfig::default()
        }
    }

    fn spawn(
        listener: &Arc<Listener>,
    ) -> (crossbeam_channel::Receiver<Bytes>, thread::JoinHandle<()>) {
        let (tx, rx) = unbounded();
        let listener = Arc::clone(listener);
        let handle = thread::spawn(move || listener.run(tx));
        (rx, handle)
    }

    #[test]
    fn forwards_frames_in_arrival_order() {
        let connector = MemoryConnector::with_read_timeout(Duration::from_millis(20));
        let listener = Arc::new(Listener::new(Arc::new(connector.clone()), &fast_config()));
        let (rx, handle) = spawn(&listener);

        let first = encode_frame(PROBE, "ASL1805180001", PING, "").to_wire_bytes();
        let second = encode_frame(PROBE, "ASL1805180002", PING, "").to_wire_bytes();
        let mut both = first.clone();
        both.extend_from_slice(&second);
        connector.inject(both);

        let got1 = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let got2 = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got1.as_ref(), first.as_slice());
        assert_eq!(got2.as_ref(), second.as_slice());

        listener.stop();
        handle.join().unwrap();
        assert_eq!(listener.state(), RunState::Stopped);
    }

    #[test]
    fn keeps_retrying_until_line_opens() {
        let connector = MemoryConnector::with_read_timeout(Duration::from_millis(20));
        connector.fail_next_opens(3);
        let listener = Arc::new(Listener::new(Arc::new(connector.clone()), &fast_config()));
        let (rx, handle) = spawn(&listener);

        let wire = encode_frame(PROBE, "ASL1805180003", PING, "").to_wire_bytes();
        connector.inject(wire.clone());

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.as_ref(), wire.as_slice());
        assert_eq!(connector.open_count(), 1);

        listener.stop();
        handle.join().unwrap();
    }

    #[test]
    fn timeout_discards_partial_frame() {
        let connector = MemoryConnector::with_read_timeout(Duration::from_millis(20));
        let listener = Arc::new(Listener::new(Arc::new(connector.clone()), &fast_config()));
        let (rx, handle) = spawn(&listener);

        connector.inject(b"UU:xASL18051".to_vec());
        thread::sleep(Duration::from_millis(100));

        let wire = encode_frame(PROBE, "ASL1805180004", PING, "").to_wire_bytes();
        connector.inject(wire.clone());

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.as_ref(), wire.as_slice());
        assert_eq!(connector.open_count(), 1);

        listener.stop();
        handle.join().unwrap();
    }

    #[test]
    fn exits_when_consumer_is_gone() {
        let connector = MemoryConnector::with_read_timeout(Duration::from_millis(20));
        let listener = Arc::new(Listener::new(Arc::new(connector.clone()), &fast_config()));
        let (rx, handle) = spawn(&listener);
        drop(rx);

        connector.inject(encode_frame(PROBE, "ASL1805180005", PING, "").to_wire_bytes());
        handle.join().unwrap();
        assert_eq!(listener.state(), RunState::Stopped);
    }
}
