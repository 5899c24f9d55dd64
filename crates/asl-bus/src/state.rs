//! Run/stop state shared between a worker loop and its controller.
//!
//! Each run gets a cancellation channel. Stopping drops the sending half,
//! so a loop blocked in `select!` on the receiver wakes at once instead of
//! at its next tick.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

/// Lifecycle of a worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Running,
            2 => RunState::Stopping,
            3 => RunState::Stopped,
            _ => RunState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Stopping => 2,
            RunState::Stopped => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ControlInner {
    state: AtomicU8,
    cancel: Mutex<Option<Sender<()>>>,
}

/// Shared handle to a loop's run state.
#[derive(Clone)]
pub struct RunControl {
    inner: Arc<ControlInner>,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                state: AtomicU8::new(RunState::Idle.as_u8()),
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// True while a run is active or winding down.
    pub fn is_active(&self) -> bool {
        matches!(self.state(), RunState::Running | RunState::Stopping)
    }

    fn set(&self, state: RunState) {
        self.inner.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Enter `Running`. Returns `None` if a run is already active.
    ///
    /// The returned guard moves the state to `Stopped` when dropped.
    pub fn begin(&self) -> Option<RunGuard> {
        let mut cancel = self.inner.cancel.lock();
        if self.is_active() {
            return None;
        }
        let (tx, rx) = bounded(0);
        *cancel = Some(tx);
        self.set(RunState::Running);
        Some(RunGuard {
            control: self.clone(),
            cancel: rx,
        })
    }

    /// Ask the active run to stop. Returns false if nothing was running.
    pub fn request_stop(&self) -> bool {
        let mut cancel = self.inner.cancel.lock();
        match cancel.take() {
            Some(tx) => {
                drop(tx);
                self.set(RunState::Stopping);
                true
            }
            None => false,
        }
    }

    fn finish(&self) {
        let mut cancel = self.inner.cancel.lock();
        cancel.take();
        self.set(RunState::Stopped);
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RunControl").field(&self.state()).finish()
    }
}

/// Proof of an active run.
pub struct RunGuard {
    control: RunControl,
    cancel: Receiver<()>,
}

impl RunGuard {
    /// Disconnects when a stop is requested or the run ends.
    pub fn cancelled(&self) -> &Receiver<()> {
        &self.cancel
    }

    pub fn stop_requested(&self) -> bool {
        self.control.state() != RunState::Running
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.control.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::RecvTimeoutError;

    use super::*;

    #[test]
    fn lifecycle() {
        let control = RunControl::new();
        assert_eq!(control.state(), RunState::Idle);

        let guard = control.begin().unwrap();
        assert!(control.is_running());
        assert!(control.begin().is_none());

        assert!(control.request_stop());
        assert_eq!(control.state(), RunState::Stopping);
        assert!(guard.stop_requested());
        assert!(!control.request_stop());

        drop(guard);
        assert_eq!(control.state(), RunState::Stopped);
        assert_eq!(control.state().to_string(), "stopped");
    }

    #[test]
    fn stop_wakes_waiting_loop() {
        let control = RunControl::new();
        let guard = control.begin().unwrap();

        let waiter = std::thread::spawn(move || {
            let res = guard.cancelled().recv_timeout(Duration::from_secs(5));
            matches!(res, Err(RecvTimeoutError::Disconnected))
        });

        std::thread::sleep(Duration::from_millis(20));
        control.request_stop();
        assert!(waiter.join().unwrap());
        assert_eq!(control.state(), RunState::Stopped);
    }

    #[test]
    fn can_restart_after_stop() {
        let control = RunControl::new();
        drop(control.begin().unwrap());
        assert_eq!(control.state(), RunState::Stopped);

        let _guard = control.begin().unwrap();
        assert!(control.is_running());
    }

    #[test]
    fn quiet_run_times_out_on_cancel_channel() {
        let control = RunControl::new();
        let guard = control.begin().unwrap();
        let res = guard.cancelled().recv_timeout(Duration::from_millis(5));
        assert!(matches!(res, Err(RecvTimeoutError::Timeout)));
    }
}
