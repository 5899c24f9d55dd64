//! Callback table for bus events.
//!
//! Error, connect and probes-cleared are single replaceable slots. Packet
//! observers live in a list addressed by [`ObserverHandle`]; removing one
//! leaves an empty slot so every other handle stays valid.
//!
//! Callbacks run on bus threads and must not block: hand work off to a
//! channel or thread if it may take a while.

use std::sync::Arc;

use asl_frame::Frame;
use parking_lot::RwLock;

use crate::error::BusError;

pub type ErrorCallback = Arc<dyn Fn(&BusError) + Send + Sync>;
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;
pub type PacketCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Stable identifier of a registered packet observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(usize);

impl ObserverHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Default)]
struct Slots {
    error: Option<ErrorCallback>,
    connect: Option<EventCallback>,
    cleared: Option<EventCallback>,
    packet: Vec<Option<PacketCallback>>,
}

#[derive(Default)]
pub struct Callbacks {
    slots: RwLock<Slots>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&self, cb: ErrorCallback) {
        self.slots.write().error = Some(cb);
    }

    pub fn set_connect(&self, cb: EventCallback) {
        self.slots.write().connect = Some(cb);
    }

    pub fn set_cleared(&self, cb: EventCallback) {
        self.slots.write().cleared = Some(cb);
    }

    /// Add a packet observer.
    pub fn add_packet(&self, cb: PacketCallback) -> ObserverHandle {
        let mut slots = self.slots.write();
        slots.packet.push(Some(cb));
        ObserverHandle(slots.packet.len() - 1)
    }

    /// Clear an observer's slot. Returns false if it was already empty.
    pub fn remove_packet(&self, handle: ObserverHandle) -> bool {
        let mut slots = self.slots.write();
        slots
            .packet
            .get_mut(handle.0)
            .and_then(Option::take)
            .is_some()
    }

    /// Number of live packet observers.
    pub fn packet_observers(&self) -> usize {
        self.slots.read().packet.iter().filter(|cb| cb.is_some()).count()
    }

    // Callbacks are cloned out so they run without the lock held and may
    // register or remove callbacks themselves.

    pub fn fire_error(&self, err: &BusError) {
        let cb = self.slots.read().error.clone();
        if let Some(cb) = cb {
            cb(err);
        }
    }

    pub fn connect_callback(&self) -> Option<EventCallback> {
        self.slots.read().connect.clone()
    }

    pub fn fire_cleared(&self) {
        let cb = self.slots.read().cleared.clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    pub fn notify_packet(&self, frame: &Frame) {
        let observers: Vec<PacketCallback> =
            self.slots.read().packet.iter().flatten().cloned().collect();
        for cb in observers {
            cb(frame);
        }
    }
}
