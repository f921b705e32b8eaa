//! Pooled resource and its lifecycle state.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Lifecycle state of a pooled resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResourceState {
    /// Available for checkout. Initial state after creation.
    Idle,
    /// Checked out by exactly one caller.
    InUse,
    /// Marked broken. Will be destroyed instead of returned to the idle collection.
    Evicted,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::InUse => "in_use",
            Self::Evicted => "evicted",
        })
    }
}

/// One physical connection tracked by a pool.
///
/// Owns its handle exclusively until destroyed. Identity is unique within the pool that
/// created it.
pub struct PooledResource<H> {
    /// Pool-scoped identity.
    id: u64,
    /// Current lifecycle state.
    state: ResourceState,
    /// Creation time, used for lifetime checks.
    created_at: Instant,
    /// Physical connection.
    handle: H,
}

impl<H> PooledResource<H> {
    /// Wrap a freshly opened and validated handle.
    pub(crate) fn new(id: u64, handle: H) -> Self {
        Self {
            id,
            state: ResourceState::Idle,
            created_at: Instant::now(),
            handle,
        }
    }

    /// Pool-scoped identity.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Time since creation.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether this resource has been marked broken.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.state == ResourceState::Evicted
    }

    /// Borrow the physical connection.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Mutably borrow the physical connection.
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    /// Give up the wrapper, keeping only the physical connection.
    pub(crate) fn into_handle(self) -> H {
        self.handle
    }

    /// Move from `from` to `to`, if currently in `from`.
    fn transition(&mut self, from: ResourceState, to: ResourceState) -> bool {
        if self.state == from {
            self.state = to;
            true
        } else {
            false
        }
    }

    /// `Idle` -> `InUse`.
    pub(crate) fn check_out(&mut self) -> bool {
        self.transition(ResourceState::Idle, ResourceState::InUse)
    }

    /// `InUse` -> `Idle`.
    pub(crate) fn check_in(&mut self) -> bool {
        self.transition(ResourceState::InUse, ResourceState::Idle)
    }

    /// Any state -> `Evicted`. Eviction is final.
    pub(crate) fn evict(&mut self) {
        self.state = ResourceState::Evicted;
    }
}

impl<H> fmt::Debug for PooledResource<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Regular checkout cycle.
    #[test]
    fn idle_in_use_idle() {
        let mut res = PooledResource::new(7, ());
        assert_eq!(res.id(), 7);
        assert_eq!(res.state(), ResourceState::Idle);
        assert!(res.check_out());
        assert_eq!(res.state(), ResourceState::InUse);
        assert!(!res.check_out());
        assert!(res.check_in());
        assert_eq!(res.state(), ResourceState::Idle);
        assert!(!res.check_in());
    }

    /// Nothing leaves the evicted state.
    #[test]
    fn evicted_is_final() {
        let mut res = PooledResource::new(1, ());
        assert!(res.check_out());
        res.evict();
        assert!(res.is_evicted());
        assert!(!res.check_in());
        assert!(!res.check_out());
        assert_eq!(res.state(), ResourceState::Evicted);
    }
}
