//! Background maintenance thread.

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tracing::trace_span;

/// Stop flag shared with the housekeeping thread.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    changed: Condvar,
}

impl StopSignal {
    /// Sleep for `interval`, or until stopped. Returns `true` if stopped.
    fn wait(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            let _ = self.changed.wait_for(&mut stopped, interval);
        }
        *stopped
    }

    fn raise(&self) {
        *self.stopped.lock() = true;
        self.changed.notify_all();
    }
}

/// Periodic maintenance runner.
///
/// Calls `tick` every `interval` on a dedicated thread, until `tick` returns `false` or the
/// housekeeper is stopped or dropped.
#[derive(Debug)]
pub(crate) struct Housekeeper {
    /// Shared stop flag.
    signal: Arc<StopSignal>,
    /// Housekeeping thread handle.
    thread: Option<JoinHandle<()>>,
}

impl Housekeeper {
    /// Spawn housekeeping thread.
    pub(crate) fn start<T>(pool_name: &str, interval: Duration, mut tick: T) -> io::Result<Self>
    where
        T: FnMut() -> bool + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = signal.clone();
        let span = trace_span!("pool_housekeeping", name = pool_name);
        let thread = thread::Builder::new()
            .name(format!("{pool_name}-housekeeper"))
            .spawn(move || {
                let _span = span.entered();
                while !thread_signal.wait(interval) {
                    if !tick() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Stop housekeeping thread and wait for it to finish its current run.
    pub(crate) fn stop(&mut self) {
        self.signal.raise();
        if let Some(thread) = self.thread.take() {
            // Never join ourselves: the last pool reference may be dropped from a tick.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        self.signal.raise();
    }
}
