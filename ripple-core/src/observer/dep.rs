//! Dependencies
//!
//! A [`Dep`] is a single publish point: "one observable slot changed". The
//! subscriber set itself lives in the runtime graph, keyed by [`DepId`]; the
//! handle only owns the id and removes the graph entry when dropped, so a
//! dependency lives exactly as long as the container slot that owns it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ReactiveError;
use crate::reactive::Runtime;

/// Unique, monotonically increasing dependency identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Allocate the next id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DepId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An observable slot that subscribers can depend on.
#[derive(Debug)]
pub struct Dep {
    id: DepId,
}

impl Dep {
    pub fn new() -> Self {
        let id = DepId::next();
        Runtime::create_dependency(id);
        Self { id }
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Subscribe the currently evaluating subscriber, if any.
    pub fn depend(&self) {
        Runtime::depend(self.id);
    }

    /// Notify every subscriber that this slot changed.
    pub fn notify(&self) -> Result<(), ReactiveError> {
        Runtime::notify(self.id)
    }

    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        Runtime::drop_dependency(self.id);
    }
}
