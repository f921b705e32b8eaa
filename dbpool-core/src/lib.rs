#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

pub mod config;
pub mod error;
pub mod factory;
mod gate;
mod housekeeping;
mod manager;
mod metrics;
#[cfg(test)]
mod mock;
pub mod pool;
mod registry;
pub mod resource;

pub use crate::{
    config::{PoolConfig, PoolSettings, UNBOUNDED_TIMEOUT},
    error::{ConfigError, Error},
    factory::{Credentials, ResourceFactory},
    metrics::PoolState,
    pool::{Pool, PooledConnection},
    resource::{PooledResource, ResourceState},
};
