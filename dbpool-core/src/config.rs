//! Pool configuration.

use std::{borrow::Cow, num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{error::ConfigError, factory::Credentials};

/// Effective acquisition timeout when configured as zero.
pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Smallest nonzero acquisition timeout accepted in configuration.
const MIN_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);
/// Smallest validation timeout accepted in configuration.
const MIN_VALIDATION_TIMEOUT: Duration = Duration::from_secs(1);
/// Nonzero lifetimes below this are replaced with the default.
const MIN_MAX_LIFETIME: Duration = Duration::from_secs(30);
/// Nonzero leak detection thresholds are raised to at least this value.
const MIN_LEAK_DETECTION_THRESHOLD: Duration = Duration::from_secs(2);

/// Pool configuration, as read from a configuration file.
///
/// Call [`PoolConfig::validate`] to turn it into [`PoolSettings`] used by the pool.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Pool name, used in logs and as a metrics label.
    ///
    /// Default is `"default"`.
    #[serde(default = "PoolConfig::default_name")]
    pub name: Cow<'static, str>,
    /// Maximum number of live resources, both idle and in use.
    ///
    /// Default is 10.
    #[serde(default = "PoolConfig::default_max_size", alias = "max_pool_size")]
    pub max_size: usize,
    /// Number of idle resources the pool tries to keep around.
    ///
    /// Unset or out of range means the same as `max_size`.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "min_idle_connections")]
    pub min_idle: Option<usize>,
    /// Maximum number of callers allowed to race for idle resources at the same time.
    ///
    /// Default is 1000.
    #[serde(default = "PoolConfig::default_max_consumers")]
    pub max_consumers: usize,
    /// Default time budget for a single acquisition.
    ///
    /// Zero means effectively unbounded. Default is 30 seconds.
    #[serde(
        default = "PoolConfig::default_acquire_timeout",
        alias = "connection_timeout",
        with = "humantime_serde"
    )]
    pub acquire_timeout: Duration,
    /// Time budget for a single health check.
    ///
    /// Default is 5 seconds.
    #[serde(
        default = "PoolConfig::default_validation_timeout",
        with = "humantime_serde"
    )]
    pub validation_timeout: Duration,
    /// Age after which idle resources are retired.
    ///
    /// Zero disables lifetime checks. Default is 30 minutes.
    #[serde(default = "PoolConfig::default_max_lifetime", with = "humantime_serde")]
    pub max_lifetime: Duration,
    /// Time a resource may stay checked out before a leak is reported.
    ///
    /// Zero disables leak detection, which is the default.
    #[serde(default, with = "humantime_serde")]
    pub leak_detection_threshold: Duration,
    /// Interval between background maintenance runs.
    ///
    /// Zero disables the background thread. Default is 30 seconds.
    #[serde(
        default = "PoolConfig::default_housekeeping_interval",
        with = "humantime_serde"
    )]
    pub housekeeping_interval: Duration,
    /// Credentials passed to the resource factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            max_size: Self::default_max_size(),
            min_idle: None,
            max_consumers: Self::default_max_consumers(),
            acquire_timeout: Self::default_acquire_timeout(),
            validation_timeout: Self::default_validation_timeout(),
            max_lifetime: Self::default_max_lifetime(),
            leak_detection_threshold: Duration::ZERO,
            housekeeping_interval: Self::default_housekeeping_interval(),
            credentials: None,
        }
    }
}

impl PoolConfig {
    /// Default value for [`Self::name`].
    #[must_use]
    #[inline]
    fn default_name() -> Cow<'static, str> {
        Cow::Borrowed("default")
    }

    /// Default value for [`Self::max_size`].
    #[must_use]
    #[inline]
    fn default_max_size() -> usize {
        10
    }

    /// Default value for [`Self::max_consumers`].
    #[must_use]
    #[inline]
    fn default_max_consumers() -> usize {
        1000
    }

    /// Default value for [`Self::acquire_timeout`].
    #[must_use]
    #[inline]
    fn default_acquire_timeout() -> Duration {
        Duration::from_secs(30)
    }

    /// Default value for [`Self::validation_timeout`].
    #[must_use]
    #[inline]
    fn default_validation_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Default value for [`Self::max_lifetime`].
    #[must_use]
    #[inline]
    fn default_max_lifetime() -> Duration {
        Duration::from_secs(30 * 60)
    }

    /// Default value for [`Self::housekeeping_interval`].
    #[must_use]
    #[inline]
    fn default_housekeeping_interval() -> Duration {
        Duration::from_secs(30)
    }

    /// Set pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set maximum number of live resources.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set number of idle resources to maintain.
    #[must_use]
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = Some(min_idle);
        self
    }

    /// Set maximum number of concurrently admitted consumers.
    #[must_use]
    pub fn with_max_consumers(mut self, max_consumers: usize) -> Self {
        self.max_consumers = max_consumers;
        self
    }

    /// Set default acquisition timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set health check timeout.
    #[must_use]
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Set maximum resource lifetime.
    #[must_use]
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set leak detection threshold.
    #[must_use]
    pub fn with_leak_detection_threshold(mut self, threshold: Duration) -> Self {
        self.leak_detection_threshold = threshold;
        self
    }

    /// Set interval between housekeeping runs.
    #[must_use]
    pub fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    /// Set credentials for new connections.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Check configuration values and normalize them.
    ///
    /// Out-of-range values that have a sensible replacement are adjusted with a warning, the rest
    /// are rejected.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any of the values can't be used to run a pool.
    pub fn validate(&self) -> Result<PoolSettings, ConfigError> {
        let max_size = NonZeroUsize::new(self.max_size).ok_or(ConfigError::MaxSize)?;
        let max_consumers =
            NonZeroUsize::new(self.max_consumers).ok_or(ConfigError::MaxConsumers)?;
        let acquire_timeout = if self.acquire_timeout.is_zero() {
            UNBOUNDED_TIMEOUT
        } else if self.acquire_timeout < MIN_ACQUIRE_TIMEOUT {
            return Err(ConfigError::AcquireTimeout {
                floor: MIN_ACQUIRE_TIMEOUT,
            });
        } else {
            self.acquire_timeout
        };
        if self.validation_timeout < MIN_VALIDATION_TIMEOUT {
            return Err(ConfigError::ValidationTimeout {
                floor: MIN_VALIDATION_TIMEOUT,
            });
        }
        let mut validation_timeout = self.validation_timeout;
        if !self.acquire_timeout.is_zero() && validation_timeout > acquire_timeout {
            warn!(
                pool = %self.name,
                "validation_timeout is greater than acquire_timeout, using acquire_timeout"
            );
            validation_timeout = acquire_timeout;
        }
        let min_idle = match self.min_idle {
            Some(n) if n <= max_size.get() => n,
            _ => max_size.get(),
        };
        let max_lifetime = if self.max_lifetime.is_zero() {
            None
        } else if self.max_lifetime < MIN_MAX_LIFETIME {
            let fallback = Self::default_max_lifetime();
            warn!(
                pool = %self.name,
                "max_lifetime is less than {}ms, using default {}ms",
                MIN_MAX_LIFETIME.as_millis(),
                fallback.as_millis()
            );
            Some(fallback)
        } else {
            Some(self.max_lifetime)
        };
        let leak_detection_threshold = if self.leak_detection_threshold.is_zero() {
            None
        } else if self.leak_detection_threshold < MIN_LEAK_DETECTION_THRESHOLD {
            warn!(
                pool = %self.name,
                "leak_detection_threshold is less than {}ms, using minimum",
                MIN_LEAK_DETECTION_THRESHOLD.as_millis()
            );
            Some(MIN_LEAK_DETECTION_THRESHOLD)
        } else {
            Some(self.leak_detection_threshold)
        };
        if let Some(creds) = &self.credentials {
            if creds.username.is_empty() {
                return Err(ConfigError::Credentials);
            }
        }
        Ok(PoolSettings {
            name: self.name.clone(),
            max_size,
            min_idle,
            max_consumers,
            acquire_timeout,
            validation_timeout,
            max_lifetime,
            leak_detection_threshold,
            housekeeping_interval: (!self.housekeeping_interval.is_zero())
                .then_some(self.housekeeping_interval),
            credentials: self.credentials.clone(),
        })
    }
}

/// Validated, immutable pool configuration.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PoolSettings {
    /// Pool name.
    pub name: Cow<'static, str>,
    /// Maximum number of live resources.
    pub max_size: NonZeroUsize,
    /// Idle resource target, never above `max_size`.
    pub min_idle: usize,
    /// Capacity of the admission gate.
    pub max_consumers: NonZeroUsize,
    /// Default acquisition budget.
    pub acquire_timeout: Duration,
    /// Health check budget, never above `acquire_timeout`.
    pub validation_timeout: Duration,
    /// Resource lifetime limit, if enabled.
    pub max_lifetime: Option<Duration>,
    /// Checkout duration that triggers a leak report, if enabled.
    pub leak_detection_threshold: Option<Duration>,
    /// Interval between housekeeping runs, if enabled.
    pub housekeeping_interval: Option<Duration>,
    /// Credentials passed to the factory.
    pub credentials: Option<Credentials>,
}
