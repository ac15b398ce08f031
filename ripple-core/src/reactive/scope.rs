//! Subscriber Scopes
//!
//! A [`Scope`] owns a group of subscribers that share a lifetime, such as the
//! watchers and render effect of one component. Tearing the scope down tears
//! down every subscriber it owns, newest first.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::subscriber::{Subscriber, SubscriberId};

pub(crate) struct ScopeInner {
    subscribers: RefCell<IndexMap<SubscriberId, Subscriber>>,
    destroying: Cell<bool>,
}

impl ScopeInner {
    pub(crate) fn is_destroying(&self) -> bool {
        self.destroying.get()
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> Option<Subscriber> {
        self.subscribers.borrow_mut().shift_remove(&id)
    }
}

/// The owning registry of a group of subscribers.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                subscribers: RefCell::new(IndexMap::new()),
                destroying: Cell::new(false),
            }),
        }
    }

    pub(crate) fn adopt(&self, subscriber: Subscriber) {
        self.inner
            .subscribers
            .borrow_mut()
            .insert(subscriber.id(), subscriber);
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner> {
        Rc::downgrade(&self.inner)
    }

    /// Number of live subscribers owned by this scope.
    pub fn len(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.borrow().contains_key(&id)
    }

    pub fn is_destroying(&self) -> bool {
        self.inner.is_destroying()
    }

    /// Tear down every owned subscriber in reverse creation order.
    pub fn teardown(&self) {
        if self.inner.destroying.replace(true) {
            return;
        }
        let owned = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
        tracing::debug!(count = owned.len(), "tearing down scope");
        for (_, subscriber) in owned.into_iter().rev() {
            subscriber.teardown();
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("len", &self.len())
            .field("destroying", &self.is_destroying())
            .finish()
    }
}
