use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::probe::Probe;

/// Registered probes, at most one per serial.
#[derive(Default)]
pub struct ProbeRegistry {
    probes: Mutex<Vec<Arc<dyn Probe>>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a probe. Returns false (and keeps the existing one) if its serial
    /// is already registered.
    pub fn register(&self, probe: Arc<dyn Probe>) -> bool {
        let mut probes = self.probes.lock();
        if probes.iter().any(|p| p.serial() == probe.serial()) {
            return false;
        }
        debug!(serial = probe.serial(), "probe registered");
        probes.push(probe);
        true
    }

    /// Remove a probe by serial. Order of the remaining probes isn't kept.
    pub fn unregister(&self, serial: &str) -> bool {
        let mut probes = self.probes.lock();
        match probes.iter().position(|p| p.serial() == serial) {
            Some(i) => {
                probes.swap_remove(i);
                debug!(serial, "probe unregistered");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.probes.lock().iter().any(|p| p.serial() == serial)
    }

    pub fn find(&self, serial: &str) -> Option<Arc<dyn Probe>> {
        self.probes
            .lock()
            .iter()
            .find(|p| p.serial() == serial)
            .cloned()
    }

    pub fn serials(&self) -> Vec<String> {
        self.probes
            .lock()
            .iter()
            .map(|p| p.serial().to_string())
            .collect()
    }

    /// Snapshot of the registered probes.
    pub fn all(&self) -> Vec<Arc<dyn Probe>> {
        self.probes.lock().clone()
    }

    /// Empty the registry, returning what was in it.
    pub fn take_all(&self) -> Vec<Arc<dyn Probe>> {
        std::mem::take(&mut *self.probes.lock())
    }

    pub fn len(&self) -> usize {
        self.probes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::FakeProbe;

    fn probe(serial: &str) -> Arc<dyn Probe> {
        Arc::new(FakeProbe::new(serial))
    }

    #[test]
    fn register_has_set_semantics() {
        let registry = ProbeRegistry::new();
        assert!(registry.register(probe("ASL1805180001")));
        assert!(!registry.register(probe("ASL1805180001")));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("ASL1805180001"));
    }

    #[test]
    fn unregister_swaps_last_into_place() {
        let registry = ProbeRegistry::new();
        for s in ["A", "B", "C", "D"] {
            registry.register(probe(s));
        }

        assert!(registry.unregister("B"));
        assert_eq!(registry.serials(), vec!["A", "D", "C"]);
        assert!(!registry.unregister("B"));
        assert!(registry.find("B").is_none());
        assert_eq!(registry.find("C").unwrap().serial(), "C");
    }

    #[test]
    fn take_all_empties() {
        let registry = ProbeRegistry::new();
        registry.register(probe("A"));
        registry.register(probe("B"));

        assert_eq!(registry.all().len(), 2);
        assert_eq!(registry.take_all().len(), 2);
        assert!(registry.is_empty());
    }
}
