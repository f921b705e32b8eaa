#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(missing_docs, clippy::missing_errors_doc)]

mod config;
mod errors;
pub mod logging;
mod util;

pub use dbpool_core::{
    ConfigError, Credentials, Error, Pool, PoolConfig, PoolSettings, PoolState, PooledConnection,
    PooledResource, ResourceFactory, ResourceState, UNBOUNDED_TIMEOUT,
};

pub use self::{
    config::{DbPoolConfig, DbPoolConfigBuilder},
    errors::SetupError,
    logging::{LoggingConfig, LoggingError},
};
