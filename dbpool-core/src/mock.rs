//! Scripted in-memory backend for testing purposes.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use crate::factory::{Credentials, ResourceFactory};

/// Error reported by [`MockFactory`].
#[derive(Debug, thiserror::Error)]
#[error("mock backend failure")]
pub(crate) struct MockError;

/// Connection handed out by [`MockFactory`].
#[derive(Debug)]
pub(crate) struct MockHandle {
    /// Order of opening, starting from zero.
    pub(crate) serial: usize,
    /// User name the connection was opened with.
    pub(crate) user: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    healthy_off: AtomicBool,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
    check_delay: Mutex<Duration>,
    broken: Mutex<HashSet<usize>>,
}

/// Backend with switchable failure modes and open/close counters.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    /// Make every health check pass or fail.
    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.state.healthy_off.store(!healthy, Ordering::SeqCst);
    }

    /// Make opening new connections fail.
    pub(crate) fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make closing connections report an error.
    pub(crate) fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Delay every health check.
    pub(crate) fn set_check_delay(&self, delay: Duration) {
        *self.state.check_delay.lock() = delay;
    }

    /// Make health checks of a single connection fail.
    pub(crate) fn break_handle(&self, serial: usize) {
        self.state.broken.lock().insert(serial);
    }

    /// Number of connections opened so far.
    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl ResourceFactory for MockFactory {
    type Handle = MockHandle;
    type Error = MockError;

    fn open(&self, credentials: Option<&Credentials>) -> Result<Self::Handle, Self::Error> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(MockError);
        }
        Ok(MockHandle {
            serial: self.state.opened.fetch_add(1, Ordering::SeqCst),
            user: credentials.map(|c| c.username.clone()),
        })
    }

    fn is_valid(&self, handle: &mut Self::Handle, _timeout: Duration) -> bool {
        let delay = *self.state.check_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        !self.state.healthy_off.load(Ordering::SeqCst)
            && !self.state.broken.lock().contains(&handle.serial)
    }

    fn close(&self, _handle: Self::Handle) -> Result<(), Self::Error> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            Err(MockError)
        } else {
            Ok(())
        }
    }
}
