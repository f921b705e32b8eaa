//! Idle and active resource collections.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::resource::PooledResource;

/// Outcome of waiting on the idle collection.
#[derive(Debug)]
pub(crate) enum Polled<H> {
    /// A resource was taken. It is now in neither collection.
    Taken(PooledResource<H>),
    /// Deadline passed with nothing available.
    TimedOut,
    /// Registry was closed before anything became available.
    Closed,
}

/// Idle queue together with the shutdown flag guarded by the same lock.
struct Idle<H> {
    queue: VecDeque<PooledResource<H>>,
    closed: bool,
}

/// Checkout record kept for every active resource.
#[derive(Debug)]
struct Checkout {
    since: Instant,
    leak_reported: bool,
}

/// Two disjoint collections of pooled resources.
///
/// Idle resources are kept in FIFO order and owned by the registry. Active resources are owned
/// by their callers, so only their membership is tracked here. Each collection has its own lock.
pub(crate) struct Registry<H> {
    /// Available resources, oldest release first.
    idle: Mutex<Idle<H>>,
    /// Signalled when a resource is put into the idle queue, or on close.
    available: Condvar,
    /// Checked out resources by identity.
    active: Mutex<HashMap<u64, Checkout>>,
    /// Live resources, including those in neither collection while being evaluated.
    live: AtomicUsize,
}

impl<H> Registry<H> {
    /// Create an empty registry.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Idle {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            active: Mutex::new(HashMap::with_capacity(capacity)),
            live: AtomicUsize::new(0),
        }
    }

    /// Number of idle resources.
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().queue.len()
    }

    /// Number of checked out resources.
    pub(crate) fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Number of live resources.
    pub(crate) fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Account for a newly created resource.
    pub(crate) fn register(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    /// Account for a destroyed resource.
    pub(crate) fn unregister(&self) {
        // Never wraps below zero.
        let _ = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Whether [`Self::close`] has been called.
    pub(crate) fn is_closed(&self) -> bool {
        self.idle.lock().closed
    }

    /// Append a resource to the idle queue and wake one waiter.
    ///
    /// Hands the resource back if the registry is closed.
    pub(crate) fn put_idle(&self, resource: PooledResource<H>) -> Result<(), PooledResource<H>> {
        let mut idle = self.idle.lock();
        if idle.closed {
            return Err(resource);
        }
        idle.queue.push_back(resource);
        drop(idle);
        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest idle resource, waiting until `deadline` if there is none.
    ///
    /// `None` as deadline means waiting indefinitely.
    pub(crate) fn take_idle(&self, deadline: Option<Instant>) -> Polled<H> {
        let mut idle = self.idle.lock();
        loop {
            if idle.closed {
                return Polled::Closed;
            }
            if let Some(resource) = idle.queue.pop_front() {
                return Polled::Taken(resource);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut idle, deadline).timed_out() {
                        // One last look, a release might have raced with the timeout.
                        return match idle.queue.pop_front() {
                            Some(resource) if !idle.closed => Polled::Taken(resource),
                            Some(resource) => {
                                idle.queue.push_front(resource);
                                Polled::Closed
                            }
                            None if idle.closed => Polled::Closed,
                            None => Polled::TimedOut,
                        };
                    }
                }
                None => self.available.wait(&mut idle),
            }
        }
    }

    /// Remove idle resources older than `max_lifetime`, keeping the order of the rest.
    pub(crate) fn take_expired(&self, max_lifetime: Duration) -> Vec<PooledResource<H>> {
        let mut idle = self.idle.lock();
        let (expired, kept) = idle
            .queue
            .drain(..)
            .partition::<Vec<_>, _>(|res| res.age() > max_lifetime);
        idle.queue.extend(kept);
        expired
    }

    /// Start tracking a checked out resource.
    pub(crate) fn activate(&self, id: u64) {
        self.active.lock().insert(
            id,
            Checkout {
                since: Instant::now(),
                leak_reported: false,
            },
        );
    }

    /// Stop tracking a checked out resource. Returns `false` if it wasn't tracked.
    pub(crate) fn deactivate(&self, id: u64) -> bool {
        self.active.lock().remove(&id).is_some()
    }

    /// Drop a resource from both collections. Absence is not an error.
    pub(crate) fn remove(&self, id: u64) {
        self.idle.lock().queue.retain(|res| res.id() != id);
        self.active.lock().remove(&id);
    }

    /// Checked out resources held longer than `threshold` and not reported before.
    ///
    /// Each checkout is reported at most once.
    pub(crate) fn overdue(&self, threshold: Duration) -> Vec<(u64, Duration)> {
        let mut active = self.active.lock();
        active
            .iter_mut()
            .filter_map(|(id, checkout)| {
                let held = checkout.since.elapsed();
                if checkout.leak_reported || held <= threshold {
                    return None;
                }
                checkout.leak_reported = true;
                Some((*id, held))
            })
            .collect()
    }

    /// Refuse further idle insertions, wake all waiters and hand over idle resources.
    pub(crate) fn close(&self) -> Vec<PooledResource<H>> {
        let mut idle = self.idle.lock();
        idle.closed = true;
        let drained = idle.queue.drain(..).collect();
        drop(idle);
        self.available.notify_all();
        drained
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn filled(ids: &[u64]) -> Registry<()> {
        let reg = Registry::new(ids.len());
        for id in ids {
            reg.register();
            assert!(reg.put_idle(PooledResource::new(*id, ())).is_ok());
        }
        reg
    }

    /// Idle queue hands out resources in insertion order.
    #[test]
    fn idle_is_fifo() {
        let reg = filled(&[1, 2, 3]);
        let order: Vec<_> = (0..3)
            .map(|_| match reg.take_idle(None) {
                Polled::Taken(res) => res.id(),
                other => panic!("unexpected poll result: {other:?}"),
            })
            .collect();
        assert_eq!(order, [1, 2, 3]);
    }

    /// Empty queue times out after the deadline.
    #[test]
    fn take_times_out() {
        let reg = filled(&[]);
        let started = Instant::now();
        let res = reg.take_idle(Some(started + Duration::from_millis(50)));
        assert!(matches!(res, Polled::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    /// Waiter is woken by a release from another thread.
    #[test]
    fn take_wakes_on_put() {
        let reg = Arc::new(filled(&[]));
        let putter = {
            let reg = reg.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                assert!(reg.put_idle(PooledResource::new(9, ())).is_ok());
            })
        };
        let res = reg.take_idle(Some(Instant::now() + Duration::from_secs(5)));
        assert!(matches!(res, Polled::Taken(r) if r.id() == 9));
        putter.join().unwrap();
    }

    /// Closing wakes waiters and refuses further resources.
    #[test]
    fn close_wakes_waiters() {
        let reg = Arc::new(filled(&[1]));
        assert_eq!(reg.close().len(), 1);
        assert!(reg.is_closed());
        assert!(matches!(reg.take_idle(None), Polled::Closed));
        assert!(reg.put_idle(PooledResource::new(2, ())).is_err());
        let reg = Arc::new(filled(&[]));
        let waiter = {
            let reg = reg.clone();
            thread::spawn(move || matches!(reg.take_idle(None), Polled::Closed))
        };
        thread::sleep(Duration::from_millis(20));
        reg.close();
        assert!(waiter.join().unwrap());
    }

    /// Removal is idempotent and covers both collections.
    #[test]
    fn remove_idempotent() {
        let reg = filled(&[1, 2]);
        reg.activate(3);
        reg.remove(1);
        reg.remove(3);
        reg.remove(3);
        reg.remove(42);
        assert_eq!(reg.idle_count(), 1);
        assert_eq!(reg.active_count(), 0);
    }

    /// Live counter never wraps below zero.
    #[test]
    fn unregister_saturates() {
        let reg = filled(&[1]);
        reg.unregister();
        reg.unregister();
        assert_eq!(reg.live_count(), 0);
    }

    /// Leaks are reported once per checkout.
    #[test]
    fn overdue_reported_once() {
        let reg = filled(&[]);
        reg.activate(5);
        assert!(reg.overdue(Duration::from_secs(60)).is_empty());
        thread::sleep(Duration::from_millis(20));
        let leaks = reg.overdue(Duration::from_millis(10));
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].0, 5);
        assert!(reg.overdue(Duration::from_millis(10)).is_empty());
    }

    /// Expired resources are split off, the rest keep their order.
    #[test]
    fn expired_split_off() {
        let reg = filled(&[1, 2]);
        thread::sleep(Duration::from_millis(30));
        assert!(reg.put_idle(PooledResource::new(3, ())).is_ok());
        let expired = reg.take_expired(Duration::from_millis(20));
        let ids: Vec<_> = expired.iter().map(PooledResource::id).collect();
        assert_eq!(ids, [1, 2]);
        assert_eq!(reg.idle_count(), 1);
    }
}
