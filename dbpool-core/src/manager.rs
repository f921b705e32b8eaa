//! Creation, health checks and destruction of pooled resources.

use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use opentelemetry::KeyValue;
use tracing::debug;

use crate::{
    config::PoolSettings,
    factory::{Credentials, ResourceFactory},
    metrics::{pool_kv, Metrics},
    registry::Registry,
    resource::PooledResource,
};

/// Result of checking an idle resource before handing it out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Resource can be handed out.
    Usable,
    /// Resource was marked broken, or failed its health check.
    Invalid,
    /// Resource outlived the configured maximum lifetime.
    Expired,
}

/// Maintenance manager for a single pool.
///
/// Owns the resource factory and the identity sequence of its pool.
pub(crate) struct Maintenance<F: ResourceFactory> {
    /// Pool name, for logs.
    name: Cow<'static, str>,
    /// Backend connection factory.
    factory: F,
    /// Credentials for new connections.
    credentials: Option<Credentials>,
    /// Maximum number of live resources.
    max_size: usize,
    /// Idle resource target.
    min_idle: usize,
    /// Health check budget.
    validation_timeout: Duration,
    /// Resource lifetime limit.
    max_lifetime: Option<Duration>,
    /// Next resource identity.
    next_id: AtomicU64,
    /// Shared resource collections.
    registry: Arc<Registry<F::Handle>>,
    /// Shared metrics storage.
    metrics: Arc<Metrics>,
    /// Premade label used to record metrics.
    label: [KeyValue; 1],
}

impl<F: ResourceFactory> Maintenance<F> {
    /// Create maintenance manager for a pool.
    pub(crate) fn new(
        settings: &PoolSettings,
        factory: F,
        registry: Arc<Registry<F::Handle>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            name: settings.name.clone(),
            factory,
            credentials: settings.credentials.clone(),
            max_size: settings.max_size.get(),
            min_idle: settings.min_idle,
            validation_timeout: settings.validation_timeout,
            max_lifetime: settings.max_lifetime,
            next_id: AtomicU64::new(0),
            registry,
            metrics,
            label: pool_kv(settings.name.clone()),
        }
    }

    /// Number of resources [`Self::fill_to_target`] would try to create right now.
    ///
    /// Tops up idle resources toward the minimum idle target without ever exceeding the maximum
    /// pool size.
    pub(crate) fn shortfall(&self) -> usize {
        let headroom = self.max_size.saturating_sub(self.registry.live_count());
        let deficit = self.min_idle.saturating_sub(self.registry.idle_count());
        headroom.min(deficit)
    }

    /// Create resources until targets are met, or creation fails.
    ///
    /// Failed attempts are skipped, not retried. Returns the number of resources created.
    pub(crate) fn fill_to_target(&self) -> usize {
        let to_add = self.shortfall();
        let added = (0..to_add).filter(|_| self.create_one()).count();
        if added < to_add {
            debug!(
                pool = %self.name,
                added,
                wanted = to_add,
                "pool is below its idle target"
            );
        }
        added
    }

    /// Open, validate and register a single resource.
    ///
    /// Never fails loudly: problems are logged, and the resource is simply not added.
    pub(crate) fn create_one(&self) -> bool {
        let started = Instant::now();
        let mut handle = match self.factory.open(self.credentials.as_ref()) {
            Ok(handle) => handle,
            Err(err) => {
                debug!(pool = %self.name, error = %err, "connection attempt failed");
                return false;
            }
        };
        if !self.validate(&mut handle) {
            debug!(pool = %self.name, "new connection failed validation");
            self.close_handle(handle);
            return false;
        }
        self.metrics.record_create(started, &self.label);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.register();
        debug!(pool = %self.name, id, "connection added to pool");
        if let Err(resource) = self.registry.put_idle(PooledResource::new(id, handle)) {
            // Raced with shutdown.
            self.destroy(resource);
            return false;
        }
        true
    }

    /// Decide whether an idle resource may be handed out.
    pub(crate) fn check(&self, resource: &mut PooledResource<F::Handle>) -> Verdict {
        if resource.is_evicted() {
            return Verdict::Invalid;
        }
        if self
            .max_lifetime
            .is_some_and(|lifetime| resource.age() > lifetime)
        {
            return Verdict::Expired;
        }
        if self.validate(resource.handle_mut()) {
            Verdict::Usable
        } else {
            Verdict::Invalid
        }
    }

    /// Close the physical connection and forget the resource.
    ///
    /// Close errors are logged and otherwise ignored.
    pub(crate) fn destroy(&self, mut resource: PooledResource<F::Handle>) {
        let id = resource.id();
        resource.evict();
        self.close_handle(resource.into_handle());
        self.registry.remove(id);
        self.registry.unregister();
        debug!(pool = %self.name, id, "connection removed from pool");
    }

    /// Run a health check within the validation budget.
    fn validate(&self, handle: &mut F::Handle) -> bool {
        let started = Instant::now();
        let valid = self.factory.is_valid(handle, self.validation_timeout);
        valid && started.elapsed() <= self.validation_timeout
    }

    /// Close a physical connection, swallowing errors.
    fn close_handle(&self, handle: F::Handle) {
        if let Err(err) = self.factory.close(handle) {
            debug!(pool = %self.name, error = %err, "error closing connection");
        }
    }
}
