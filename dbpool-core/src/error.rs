//! Error types and error support code.

use std::{io, time::Duration};

/// Error type returned by pool operations.
///
/// Only pool construction and resource acquisition can fail. Releasing a connection never
/// reports an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No valid resource became available before the acquisition deadline.
    #[error("timeout after {}ms of waiting for a connection", elapsed.as_millis())]
    AcquireTimeout {
        /// Wall-clock time spent inside the acquisition attempt.
        elapsed: Duration,
    },
    /// Waiting for a resource was cut short because the pool is shutting down.
    #[error("interrupted during connection acquisition: pool is closed")]
    Interrupted,
    /// Pool configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Background housekeeping thread could not be started.
    #[error("unable to start pool housekeeping thread: {0}")]
    Spawn(#[from] io::Error),
}

impl Error {
    /// Whether this error reports an exhausted acquisition deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquireTimeout { .. })
    }
}

/// Invalid pool configuration.
///
/// These are fatal at construction time and prevent the pool from starting.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Maximum pool size must allow for at least one resource.
    #[error("max_size cannot be less than 1")]
    MaxSize,
    /// At least one consumer must be admitted at a time.
    #[error("max_consumers cannot be less than 1")]
    MaxConsumers,
    /// Acquisition timeout is nonzero, but below the allowed floor.
    #[error("acquire_timeout cannot be less than {}ms", floor.as_millis())]
    AcquireTimeout {
        /// Smallest accepted nonzero value.
        floor: Duration,
    },
    /// Validation timeout is below the allowed floor.
    #[error("validation_timeout cannot be less than {}ms", floor.as_millis())]
    ValidationTimeout {
        /// Smallest accepted value.
        floor: Duration,
    },
    /// Credentials were supplied with an empty user name.
    #[error("credentials must include a non-empty username")]
    Credentials,
}
