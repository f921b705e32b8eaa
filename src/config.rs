//! Service configuration structures.

use std::collections::BTreeMap;

use dbpool_core::{Pool, PoolConfig, ResourceFactory};
use serde::{Deserialize, Serialize};

use crate::{errors::SetupError, logging::LoggingConfig};

/// Root container for service configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct DbPoolConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Pool configurations, by pool name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pools: BTreeMap<String, PoolConfig>,
}

impl DbPoolConfig {
    /// Create builder for service configuration.
    pub fn builder() -> DbPoolConfigBuilder {
        DbPoolConfigBuilder::new()
    }

    /// Get configuration of a named pool.
    ///
    /// Pool name is always taken from the map key.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no pool with this name was configured.
    pub fn pool(&self, name: &str) -> Result<PoolConfig, SetupError> {
        self.pools
            .get(name)
            .map(|cfg| cfg.clone().with_name(name.to_owned()))
            .ok_or_else(|| SetupError::UnknownPool(name.into()))
    }

    /// Start a named pool, using provided backend factory.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no pool with this name was configured, or if the pool failed to start.
    pub fn build_pool<F: ResourceFactory>(
        &self,
        name: &str,
        factory: F,
    ) -> Result<Pool<F>, SetupError> {
        let cfg = self.pool(name)?;
        Pool::new(&cfg, factory).map_err(Into::into)
    }
}

/// Builder for service configuration.
#[must_use]
pub struct DbPoolConfigBuilder {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl DbPoolConfigBuilder {
    /// Alternative method to construct a service configuration builder.
    pub fn new() -> Self {
        Self {
            builder: config::Config::builder(),
        }
    }

    /// Try to build configuration object from preconfigured sources.
    ///
    /// This method will do all the I/O necessary to load the configuration.
    ///
    /// See [`config::builder::ConfigBuilder::build`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if some configuration loading was unsuccessful.
    pub fn build(self) -> Result<DbPoolConfig, SetupError> {
        self.builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Add a custom object implementing [`Source`] trait as a source of service configuration.
    ///
    /// [`Source`]: config::Source
    pub fn with_source<T>(mut self, source: T) -> Self
    where
        T: config::Source + Send + Sync + 'static,
    {
        self.builder = self.builder.add_source(source);
        self
    }

    /// Add file as a source of service configuration.
    ///
    /// File extension may be omitted, all supported formats are tried in that case.
    pub fn with_file(self, name: impl AsRef<str>) -> Self {
        self.with_source(config::File::with_name(name.as_ref()))
    }

    /// Add environment variables as a source of service configuration.
    ///
    /// Variable `PREFIX__POOLS_MAIN_CREDENTIALS_USERNAME` sets `pools.main.credentials.username`.
    pub fn with_env(self, prefix: impl AsRef<str>) -> Self {
        self.with_source(env_source(prefix.as_ref()))
    }
}

impl Default for DbPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn env_source(prefix: &str) -> config::Environment {
    config::Environment::with_prefix(prefix)
        .separator("_")
        .prefix_separator("__")
}
