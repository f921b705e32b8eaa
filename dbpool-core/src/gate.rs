//! Admission gate bounding concurrent consumers.

use std::num::NonZeroUsize;

use parking_lot::{Condvar, Mutex};

/// Counting gate limiting how many callers can be inside the acquisition path at once.
///
/// Waiting for a permit can't be cancelled. Callers wanting a bound on waiting time should
/// rely on acquisition timeouts.
#[derive(Debug)]
pub(crate) struct AdmissionGate {
    /// Currently available permits.
    available: Mutex<usize>,
    /// Signalled whenever a permit is returned.
    returned: Condvar,
}

impl AdmissionGate {
    /// Create a gate with all permits available.
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            available: Mutex::new(capacity.get()),
            returned: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub(crate) fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.returned.wait(&mut available);
        }
        *available -= 1;
        Permit { gate: self }
    }

    /// Number of permits not currently held.
    pub(crate) fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Return a single permit.
    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        drop(available);
        self.returned.notify_one();
    }
}

/// Permit to be inside the acquisition path.
///
/// Returned to the gate on drop, whatever the outcome of the acquisition.
#[derive(Debug)]
#[must_use]
pub(crate) struct Permit<'g> {
    gate: &'g AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
