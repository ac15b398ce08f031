//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. The computation does not run on creation. It runs on first access.
//!
//! 2. When accessed again, if no dependencies have notified, returns the
//!    cached value.
//!
//! 3. When a dependency notifies, the memo is only marked dirty.
//!
//! 4. The next access recomputes once, no matter how many notifications
//!    arrived in between.
//!
//! Reading a memo inside another evaluation makes the reader depend on
//! everything the memo depends on, so the reader is notified even though the
//! memo itself never publishes anything.

use std::fmt::Debug;

use super::subscriber::{Subscriber, SubscriberId};
use crate::error::ReactiveError;
use crate::observer::Value;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed (or the memo was never computed).
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
#[derive(Clone)]
#[must_use = "dropping the last handle unregisters the memo"]
pub struct Memo {
    subscriber: Subscriber,
}

impl Memo {
    /// Create a new memo with the given computation function.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Self::try_new(move || Ok(compute()))
    }

    /// Create a memo whose computation can fail.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<Value, ReactiveError> + 'static,
    {
        Self {
            subscriber: Subscriber::builder(compute).lazy().assemble(),
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> Result<Value, ReactiveError> {
        self.subscriber.demand()
    }

    /// Force the next access to recompute.
    pub fn mark_dirty(&self) {
        self.subscriber.mark_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.subscriber.is_dirty()
    }

    pub fn state(&self) -> MemoState {
        if self.is_dirty() {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    pub fn dependency_count(&self) -> usize {
        self.subscriber.dependency_count()
    }

    /// Stop tracking. The cached value stays readable.
    pub fn dispose(&self) {
        self.subscriber.teardown();
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.subscriber_id())
            .field("state", &self.state())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
