//! Pool core controller and checked out connections.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::{Duration, Instant},
};

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{debug, debug_span, info, warn};

use crate::{
    config::{PoolConfig, PoolSettings},
    error::Error,
    factory::ResourceFactory,
    gate::AdmissionGate,
    housekeeping::Housekeeper,
    manager::{Maintenance, Verdict},
    metrics::{pool_kv, Metrics, PoolState, POOL_METRICS},
    registry::{Polled, Registry},
    resource::{PooledResource, ResourceState},
};

/// Bounded pool of validated backend connections.
///
/// Cloning is cheap, and all clones refer to the same pool.
pub struct Pool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

/// Shared state of a pool.
struct PoolInner<F: ResourceFactory> {
    /// Validated configuration.
    settings: PoolSettings,
    /// Bounds the number of callers inside the acquisition path.
    gate: AdmissionGate,
    /// Idle and active collections.
    registry: Arc<Registry<F::Handle>>,
    /// Creates and destroys resources.
    manager: Maintenance<F>,
    /// Linked metrics storage.
    metrics: Arc<Metrics>,
    /// Premade label used to record metrics.
    label: [KeyValue; 1],
    /// Time of last gathering of common pool metrics.
    last_gathered_at: Mutex<Instant>,
    /// Background maintenance, if enabled.
    housekeeper: Mutex<Option<Housekeeper>>,
}

impl<F: ResourceFactory> Pool<F> {
    /// Validate configuration and start a pool.
    ///
    /// The pool is filled toward its idle target before returning. An unavailable backend does
    /// not prevent the pool from starting, it merely starts below target.
    ///
    /// # Errors
    ///
    /// Returns `Err` if configuration is invalid, or if the housekeeping thread could not be
    /// started.
    pub fn new(config: &PoolConfig, factory: F) -> Result<Self, Error> {
        Self::with_settings(config.validate()?, factory)
    }

    /// Start a pool using already validated settings.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the housekeeping thread could not be started.
    pub fn with_settings(settings: PoolSettings, factory: F) -> Result<Self, Error> {
        let metrics = POOL_METRICS.deref().clone();
        let registry = Arc::new(Registry::new(settings.max_size.get()));
        let manager = Maintenance::new(&settings, factory, registry.clone(), metrics.clone());
        let inner = Arc::new(PoolInner {
            gate: AdmissionGate::new(settings.max_consumers),
            label: pool_kv(settings.name.clone()),
            settings,
            registry,
            manager,
            metrics,
            last_gathered_at: Mutex::new(Instant::now()),
            housekeeper: Mutex::new(None),
        });
        let added = inner.manager.fill_to_target();
        if let Some(interval) = inner.settings.housekeeping_interval {
            let weak = Arc::downgrade(&inner);
            let started = Housekeeper::start(&inner.settings.name, interval, move || {
                match weak.upgrade() {
                    Some(inner) => {
                        inner.housekeep();
                        !inner.registry.is_closed()
                    }
                    None => false,
                }
            });
            match started {
                Ok(housekeeper) => *inner.housekeeper.lock() = Some(housekeeper),
                Err(err) => {
                    inner.shutdown();
                    return Err(err.into());
                }
            }
        }
        inner.metrics.record_state(&inner.label, &inner.state());
        info!(
            pool = %inner.settings.name,
            connections = added,
            max_size = inner.settings.max_size.get(),
            "connection pool started"
        );
        Ok(Self { inner })
    }

    /// Acquire a connection, waiting up to the configured acquisition timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AcquireTimeout`] if no valid connection became available in time, or
    /// [`Error::Interrupted`] if the pool was closed.
    pub fn acquire(&self) -> Result<PooledConnection<F>, Error> {
        self.acquire_timeout(self.inner.settings.acquire_timeout)
    }

    /// Acquire a connection, waiting for a bounded time.
    ///
    /// Idle connections failing their health check are destroyed, and the next one is tried
    /// within the same time budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AcquireTimeout`] if no valid connection became available in time, or
    /// [`Error::Interrupted`] if the pool was closed.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<F>, Error> {
        let inner = &self.inner;
        let _span = debug_span!("pool_acquire", name = %inner.settings.name).entered();
        let _permit = inner.gate.acquire();
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        loop {
            let mut resource = match inner.registry.take_idle(deadline) {
                Polled::Taken(resource) => resource,
                Polled::TimedOut => break,
                Polled::Closed => return Err(Error::Interrupted),
            };
            match inner.manager.check(&mut resource) {
                Verdict::Usable => {
                    resource.check_out();
                    inner.registry.activate(resource.id());
                    inner.metrics.record_wait(start, &inner.label);
                    inner.update_metrics();
                    return Ok(PooledConnection {
                        pool: inner.clone(),
                        resource: Some(resource),
                        time: Instant::now(),
                    });
                }
                verdict => {
                    debug!(
                        pool = %inner.settings.name,
                        id = resource.id(),
                        ?verdict,
                        "discarding connection"
                    );
                    inner.manager.destroy(resource);
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        break;
                    }
                }
            }
        }
        let elapsed = start.elapsed();
        inner.metrics.record_timeout(&inner.label);
        inner.log_state("timeout failure ");
        Err(Error::AcquireTimeout { elapsed })
    }

    /// Return a connection to the pool.
    ///
    /// Same as dropping the connection.
    pub fn release(&self, connection: PooledConnection<F>) {
        if !Arc::ptr_eq(&self.inner, &connection.pool) {
            warn!(
                pool = %self.inner.settings.name,
                owner = %connection.pool.settings.name,
                "connection released to a pool it doesn't belong to"
            );
        }
        drop(connection);
    }

    /// Number of live connections.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.inner.registry.live_count()
    }

    /// Number of idle connections.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.registry.idle_count()
    }

    /// Number of checked out connections.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// Snapshot of pool counts.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.state()
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.settings.name
    }

    /// Validated pool configuration.
    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Whether [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    /// Shut the pool down.
    ///
    /// Stops housekeeping, closes all idle connections, and wakes waiting callers, who get
    /// [`Error::Interrupted`]. Connections still checked out are closed as they are returned.
    pub fn close(&self) {
        let housekeeper = self.inner.housekeeper.lock().take();
        if let Some(mut housekeeper) = housekeeper {
            housekeeper.stop();
        }
        let closed = self.inner.shutdown();
        info!(
            pool = %self.inner.settings.name,
            closed,
            in_use = self.inner.registry.active_count(),
            "connection pool closed"
        );
    }
}

impl<F: ResourceFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.settings.name)
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    /// Put a returned resource back into the idle collection, or destroy it.
    fn release(&self, mut resource: PooledResource<F::Handle>) {
        if resource.is_evicted() {
            debug!(
                pool = %self.settings.name,
                id = resource.id(),
                "connection returned to pool is broken or evicted, closing connection"
            );
            self.manager.destroy(resource);
            return;
        }
        resource.check_in();
        self.registry.deactivate(resource.id());
        if let Err(resource) = self.registry.put_idle(resource) {
            self.manager.destroy(resource);
        }
    }

    /// Single housekeeping run.
    fn housekeep(&self) {
        if self.registry.is_closed() {
            return;
        }
        if let Some(lifetime) = self.settings.max_lifetime {
            for resource in self.registry.take_expired(lifetime) {
                debug!(
                    pool = %self.settings.name,
                    id = resource.id(),
                    "retiring connection past its maximum lifetime"
                );
                self.manager.destroy(resource);
            }
        }
        if let Some(threshold) = self.settings.leak_detection_threshold {
            for (id, held) in self.registry.overdue(threshold) {
                warn!(
                    pool = %self.settings.name,
                    id,
                    ?held,
                    "connection leak detection triggered, connection may have been leaked"
                );
            }
        }
        self.manager.fill_to_target();
        self.metrics.record_state(&self.label, &self.state());
        self.log_state("after housekeeping ");
    }

    /// Close registry and destroy idle resources. Returns number of destroyed resources.
    fn shutdown(&self) -> usize {
        let drained = self.registry.close();
        let count = drained.len();
        for resource in drained {
            self.manager.destroy(resource);
        }
        count
    }

    fn state(&self) -> PoolState {
        PoolState {
            max_size: self.settings.max_size.get(),
            size: self.registry.live_count(),
            idle: self.registry.idle_count(),
            in_use: self.registry.active_count(),
            min_idle: self.settings.min_idle,
        }
    }

    /// Refresh pool state gauges, at most once per probe interval.
    fn update_metrics(&self) {
        const PROBE_INTERVAL: Duration = Duration::from_secs(15);
        let mut last_gathered_at = self.last_gathered_at.lock();
        if last_gathered_at.elapsed() > PROBE_INTERVAL {
            *last_gathered_at = Instant::now();
            drop(last_gathered_at);
            self.metrics.record_state(&self.label, &self.state());
        }
    }

    fn log_state(&self, prefix: &str) {
        let state = self.state();
        debug!(
            pool = %self.settings.name,
            total = state.size,
            in_use = state.in_use,
            idle = state.idle,
            acquiring = self.settings.max_consumers.get().saturating_sub(self.gate.available()),
            "{prefix}pool stats"
        );
    }
}

impl<F: ResourceFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Connection checked out of a [`Pool`].
///
/// Dereferences to the underlying handle, so it can be used in place of it. Dropping it returns
/// the connection to the pool, unless it was marked as evicted, in which case the physical
/// connection is closed.
pub struct PooledConnection<F: ResourceFactory> {
    /// Originating pool.
    pool: Arc<PoolInner<F>>,
    /// Checked out resource. Always `Some` until dropped.
    resource: Option<PooledResource<F::Handle>>,
    /// Retrieval time.
    time: Instant,
}

impl<F: ResourceFactory> PooledConnection<F> {
    fn resource(&self) -> &PooledResource<F::Handle> {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled connection used after release"),
        }
    }

    fn resource_mut(&mut self) -> &mut PooledResource<F::Handle> {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled connection used after release"),
        }
    }

    /// Pool-scoped identity of this connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.resource().id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.resource().state()
    }

    /// Time since the physical connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.resource().age()
    }

    /// Mark the connection as broken.
    ///
    /// It will be destroyed instead of being returned to the pool.
    pub fn mark_evicted(&mut self) {
        self.resource_mut().evict();
    }

    /// Return the connection to the pool.
    ///
    /// Same as dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl<F: ResourceFactory> Deref for PooledConnection<F> {
    type Target = F::Handle;

    fn deref(&self) -> &Self::Target {
        self.resource().handle()
    }
}

impl<F: ResourceFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource_mut().handle_mut()
    }
}

impl<F: ResourceFactory> AsRef<F::Handle> for PooledConnection<F> {
    fn as_ref(&self) -> &F::Handle {
        self
    }
}

impl<F: ResourceFactory> AsMut<F::Handle> for PooledConnection<F> {
    fn as_mut(&mut self) -> &mut F::Handle {
        self
    }
}

impl<F: ResourceFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.settings.name)
            .field("resource", &self.resource)
            .field("held", &self.time.elapsed())
            .finish()
    }
}

impl<F: ResourceFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            // Record time spent outside the pool.
            self.pool.metrics.record_use(self.time, &self.pool.label);
            self.pool.release(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, thread};

    use super::*;
    use crate::{factory::Credentials, mock::MockFactory};

    /// Test configuration with housekeeping disabled.
    fn config(max_size: usize) -> PoolConfig {
        PoolConfig::default()
            .with_name("test")
            .with_max_size(max_size)
            .with_housekeeping_interval(Duration::ZERO)
    }

    fn pool(cfg: &PoolConfig) -> (Pool<MockFactory>, MockFactory) {
        let factory = MockFactory::default();
        let pool = Pool::new(cfg, factory.clone()).unwrap();
        (pool, factory)
    }

    /// Fresh pool has its idle target ready, nothing in use.
    #[test]
    fn filled_on_creation() {
        let (pool, _) = pool(&config(8).with_min_idle(3));
        assert!(pool.total_count() >= 3);
        assert_eq!(pool.idle_count(), pool.total_count());
        assert_eq!(pool.active_count(), 0);
        assert_eq!(
            pool.state(),
            PoolState {
                max_size: 8,
                size: 3,
                idle: 3,
                in_use: 0,
                min_idle: 3,
            }
        );
    }

    /// Configuration errors prevent the pool from starting.
    #[test]
    fn invalid_config_rejected() {
        let err = Pool::new(&config(0), MockFactory::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    /// Acquire and release cycle.
    #[test]
    fn acquire_release() {
        let (pool, factory) = pool(&config(1));
        let idle_before = pool.idle_count();
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.state(), ResourceState::InUse);
        assert_eq!(pool.idle_count(), idle_before - 1);
        assert_eq!(pool.active_count(), 1);
        let id = conn.id();
        pool.release(conn);
        assert_eq!(pool.idle_count(), idle_before);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(factory.closed(), 0);
        let again = pool.acquire().unwrap();
        assert_eq!(again.id(), id);
    }

    /// Dropping a connection is a logical close.
    #[test]
    fn drop_returns_to_pool() {
        let (pool, factory) = pool(&config(2));
        let conn = pool.acquire().unwrap();
        let idle = pool.idle_count();
        drop(conn);
        assert_eq!(pool.idle_count(), idle + 1);
        assert_eq!(pool.total_count(), 2);
        assert_eq!(factory.closed(), 0);
    }

    /// Connection dereferences to the driver handle.
    #[test]
    fn handle_passthrough() {
        let cfg = config(1).with_credentials(Credentials::new("app", "secret"));
        let (pool, _) = pool(&cfg);
        let mut conn = pool.acquire().unwrap();
        assert_eq!(conn.serial, 0);
        assert_eq!(conn.user.as_deref(), Some("app"));
        conn.user = None;
        assert!(conn.as_ref().user.is_none());
    }

    /// Evicted connections are destroyed on release.
    #[test]
    fn evicted_destroyed_on_release() {
        let (pool, factory) = pool(&config(3));
        let total = pool.total_count();
        let mut conn = pool.acquire().unwrap();
        conn.mark_evicted();
        assert_eq!(conn.state(), ResourceState::Evicted);
        conn.release();
        assert_eq!(pool.total_count(), total - 1);
        assert_eq!(pool.idle_count(), total - 1);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(factory.closed(), 1);
    }

    /// Exhausted pool times out after the deadline.
    #[test]
    fn exhausted_pool_times_out() {
        let cfg = config(2).with_acquire_timeout(Duration::from_secs(1));
        let (pool, _) = pool(&cfg);
        let held: Vec<_> = (0..pool.total_count())
            .map(|_| pool.acquire().unwrap())
            .collect();
        let started = Instant::now();
        let err = pool.acquire().unwrap_err();
        let waited = started.elapsed();
        assert!(err.is_timeout());
        assert!(waited >= Duration::from_secs(1), "gave up after {waited:?}");
        assert!(waited < Duration::from_secs(3), "waited for {waited:?}");
        match err {
            Error::AcquireTimeout { elapsed } => assert!(elapsed >= Duration::from_secs(1)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pool.inner.gate.available(), 1000);
        drop(held);
        assert_eq!(pool.idle_count(), 2);
    }

    /// Waiter is served by a release from another thread.
    #[test]
    fn waiter_gets_released_connection() {
        let (pool, _) = pool(&config(1));
        let conn = pool.acquire().unwrap();
        let id = conn.id();
        thread::scope(|s| {
            let waiter = s.spawn(|| pool.acquire_timeout(Duration::from_secs(5)).map(|c| c.id()));
            thread::sleep(Duration::from_millis(50));
            drop(conn);
            assert_eq!(waiter.join().unwrap().unwrap(), id);
        });
    }

    /// Broken idle connection is skipped in favour of a healthy one.
    #[test]
    fn invalid_connection_skipped() {
        let (pool, factory) = pool(&config(2));
        factory.break_handle(0);
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id(), 1);
        assert_eq!(conn.serial, 1);
        assert_eq!(pool.total_count(), 1);
        assert_eq!(factory.closed(), 1);
    }

    /// All connections broken: retries exhaust the deadline.
    #[test]
    fn unhealthy_backend_times_out() {
        let (pool, factory) = pool(&config(3));
        factory.set_healthy(false);
        let err = pool.acquire_timeout(Duration::from_millis(300)).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pool.total_count(), 0);
        assert_eq!(factory.closed(), 3);
    }

    /// Pool starts empty when the backend is down.
    #[test]
    fn backend_down_on_start() {
        let factory = MockFactory::default();
        factory.fail_open(true);
        let pool = Pool::new(&config(4), factory.clone()).unwrap();
        assert_eq!(pool.total_count(), 0);
        assert!(pool
            .acquire_timeout(Duration::from_millis(100))
            .unwrap_err()
            .is_timeout());
    }

    /// Concurrent callers never share a connection, and counts stay consistent.
    #[test]
    fn concurrent_acquire_release() {
        let (pool, _) = pool(&config(4).with_max_consumers(3));
        let held = Mutex::new(HashSet::new());
        thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let conn = pool.acquire().unwrap();
                        assert!(held.lock().insert(conn.id()), "connection handed out twice");
                        thread::yield_now();
                        assert!(held.lock().remove(&conn.id()));
                        drop(conn);
                    }
                });
            }
        });
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count() + pool.active_count(), pool.total_count());
        assert_eq!(pool.total_count(), 4);
        assert_eq!(pool.inner.gate.available(), 3);
    }

    /// Closing wakes waiters and destroys connections.
    #[test]
    fn close_interrupts_waiters() {
        let (pool, factory) = pool(&config(2));
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        thread::scope(|s| {
            let waiter = s.spawn(|| pool.acquire_timeout(Duration::from_secs(10)));
            thread::sleep(Duration::from_millis(50));
            pool.close();
            assert!(matches!(waiter.join().unwrap(), Err(Error::Interrupted)));
        });
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire(), Err(Error::Interrupted)));
        drop(first);
        second.release();
        assert_eq!(pool.total_count(), 0);
        assert_eq!(factory.closed(), 2);
    }

    /// Connections are closed once the last reference to the pool is gone.
    #[test]
    fn drop_closes_idle() {
        let (pool, factory) = pool(&config(3));
        let conn = pool.acquire().unwrap();
        drop(pool);
        assert_eq!(factory.closed(), 0);
        drop(conn);
        assert_eq!(factory.closed(), 3);
    }

    /// Housekeeping replaces destroyed connections.
    #[test]
    fn housekeeping_refills() {
        let cfg = config(3).with_housekeeping_interval(Duration::from_millis(20));
        let (pool, factory) = pool(&cfg);
        let mut conn = pool.acquire().unwrap();
        conn.mark_evicted();
        drop(conn);
        assert_eq!(pool.total_count(), 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.total_count() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.total_count(), 3);
        assert_eq!(factory.opened(), 4);
        pool.close();
    }

    /// Housekeeping fills the pool once the backend recovers.
    #[test]
    fn housekeeping_recovers_backend() {
        let factory = MockFactory::default();
        factory.fail_open(true);
        let cfg = config(2).with_housekeeping_interval(Duration::from_millis(20));
        let pool = Pool::new(&cfg, factory.clone()).unwrap();
        assert_eq!(pool.total_count(), 0);
        factory.fail_open(false);
        let conn = pool.acquire_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(conn.state(), ResourceState::InUse);
        drop(conn);
        pool.close();
    }

    /// Settings with limits below configuration floors, for time-based tests.
    fn short_lived(cfg: &PoolConfig, lifetime: Option<Duration>) -> PoolSettings {
        let mut settings = cfg.validate().unwrap();
        settings.max_lifetime = lifetime;
        settings
    }

    /// Idle connections past their lifetime are destroyed at acquire, never handed out.
    #[test]
    fn expired_destroyed_on_acquire() {
        let settings = short_lived(&config(2), Some(Duration::from_millis(50)));
        let factory = MockFactory::default();
        let pool = Pool::with_settings(settings, factory.clone()).unwrap();
        assert_eq!(pool.total_count(), 2);
        thread::sleep(Duration::from_millis(80));
        let err = pool.acquire_timeout(Duration::from_millis(200)).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pool.total_count(), 0);
        assert_eq!(factory.closed(), 2);
        assert_eq!(factory.opened(), 2);
    }

    /// Housekeeping retires expired idle connections and refills the pool.
    #[test]
    fn housekeeping_retires_expired() {
        let cfg = config(2).with_housekeeping_interval(Duration::from_millis(20));
        let settings = short_lived(&cfg, Some(Duration::from_millis(100)));
        let factory = MockFactory::default();
        let pool = Pool::with_settings(settings, factory.clone()).unwrap();
        assert_eq!(factory.opened(), 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut refilled = false;
        while !refilled && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
            refilled = factory.opened() >= 4 && pool.total_count() == 2;
        }
        assert!(refilled, "opened {}, total {}", factory.opened(), pool.total_count());
        assert!(factory.closed() >= 2, "closed {}", factory.closed());
        assert_eq!(pool.active_count(), 0);
        pool.close();
    }

    /// Housekeeping flags connections held past the leak threshold.
    #[test]
    fn housekeeping_reports_leaks() {
        let cfg = config(2).with_housekeeping_interval(Duration::from_millis(20));
        let mut settings = short_lived(&cfg, None);
        settings.leak_detection_threshold = Some(Duration::from_millis(30));
        let pool = Pool::with_settings(settings, MockFactory::default()).unwrap();
        let leaked = pool.acquire().unwrap();
        thread::sleep(Duration::from_millis(500));
        let fresh = pool.acquire().unwrap();
        // Already reported checkouts are not reported again.
        let unreported: Vec<u64> = pool
            .inner
            .registry
            .overdue(Duration::ZERO)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(unreported, vec![fresh.id()]);
        assert_ne!(leaked.id(), fresh.id());
        drop(leaked);
        drop(fresh);
        assert_eq!(pool.idle_count(), 2);
        pool.close();
    }
}
