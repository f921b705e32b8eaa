//! Boundary with the backend driver.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opens, checks and closes physical backend connections on behalf of a pool.
///
/// Implementations are typically thin adapters over a database driver. The pool never touches a
/// handle other than through these methods, the [`Deref`] pass-through of
/// [`PooledConnection`](crate::PooledConnection), or by dropping it.
///
/// [`Deref`]: std::ops::Deref
pub trait ResourceFactory: Send + Sync + 'static {
    /// Physical connection type.
    type Handle: Send + 'static;
    /// Error type reported by the driver.
    type Error: std::error::Error + Send + 'static;

    /// Open a new physical connection.
    ///
    /// `credentials` is `Some` when the pool was configured with explicit credentials.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend could not produce a connection. The pool logs this and
    /// carries on without the resource.
    fn open(&self, credentials: Option<&Credentials>) -> Result<Self::Handle, Self::Error>;

    /// Check whether a connection is still usable.
    ///
    /// Implementations should give up once `timeout` has passed. A check that reports success
    /// after exceeding `timeout` is still treated as a failure by the pool.
    fn is_valid(&self, handle: &mut Self::Handle, timeout: Duration) -> bool;

    /// Physically close a connection.
    ///
    /// Default implementation simply drops the handle.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend reported a problem while closing. The pool only logs it.
    fn close(&self, handle: Self::Handle) -> Result<(), Self::Error> {
        drop(handle);
        Ok(())
    }
}

/// User name and password passed to [`ResourceFactory::open`].
///
/// The password is wiped from memory on drop, and is never printed or serialized.
#[derive(Clone, Deserialize, PartialEq, Eq, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Backend user name.
    pub username: String,
    /// Backend password.
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl Credentials {
    /// Bundle user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
