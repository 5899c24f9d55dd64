//! In-memory line for tests.
//!
//! Bytes handed to [`MemoryConnector::inject`] come out of `read` on any open
//! line; everything written to any line is captured and can be inspected
//! with [`MemoryConnector::written`].

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{LineError, Result};
use crate::traits::{Connector, Line};

struct Shared {
    inbound_tx: Sender<Vec<u8>>,
    inbound_rx: Receiver<Vec<u8>>,
    written: Mutex<Vec<u8>>,
    writes: Mutex<Vec<Vec<u8>>>,
    opens: AtomicUsize,
    fail_opens: AtomicUsize,
    fail_writes: AtomicUsize,
    read_timeout: Duration,
}

/// Connector that hands out in-memory lines sharing one set of buffers.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::with_read_timeout(Duration::from_millis(50))
    }

    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                inbound_tx,
                inbound_rx,
                written: Mutex::new(Vec::new()),
                writes: Mutex::new(Vec::new()),
                opens: AtomicUsize::new(0),
                fail_opens: AtomicUsize::new(0),
                fail_writes: AtomicUsize::new(0),
                read_timeout,
            }),
        }
    }

    /// Queue bytes for the next read on any open line.
    pub fn inject(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.shared.inbound_tx.send(bytes.into());
    }

    /// All bytes written so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().clone()
    }

    /// Individual write calls, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.writes.lock().clone()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Make the next `n` opens fail.
    pub fn fail_next_opens(&self, n: usize) {
        self.shared.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail with `BrokenPipe`.
    pub fn fail_next_writes(&self, n: usize) {
        self.shared.fail_writes.store(n, Ordering::SeqCst);
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Connector for MemoryConnector {
    fn open(&self) -> Result<Box<dyn Line>> {
        if take_one(&self.shared.fail_opens) {
            return Err(LineError::Open {
                path: self.name(),
                source: serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "simulated open failure",
                ),
            });
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryLine {
            shared: Arc::clone(&self.shared),
            pending: Vec::new(),
        }))
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

/// One open in-memory line.
pub struct MemoryLine {
    shared: Arc<Shared>,
    pending: Vec<u8>,
}

impl Read for MemoryLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.shared.inbound_rx.recv_timeout(self.shared.read_timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for MemoryLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if take_one(&self.shared.fail_writes) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        self.shared.written.lock().extend_from_slice(buf);
        self.shared.writes.lock().push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
