use thiserror::Error;

use crate::logging::LoggingError;

/// Error type returned while setting up pools from service configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// Configuration could not be loaded.
    #[error("Unable to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    /// Logging could not be initialized.
    #[error(transparent)]
    Logging(#[from] LoggingError),
    /// Pool could not be started.
    #[error("Unable to start pool: {0}")]
    Pool(#[from] dbpool_core::Error),
    /// No pool with this name is defined in configuration.
    #[error("Pool is not configured: {0}")]
    UnknownPool(String),
}
