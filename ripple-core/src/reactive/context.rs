//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! This enables automatic dependency tracking: when a dependency is read,
//! the current subscriber is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When a subscriber evaluates, it pushes an entry onto the stack; when the
//! evaluation completes (or unwinds), the entry is popped.
//!
//! Each entry also collects the dependencies read during this evaluation,
//! deduplicated, so the subscriber can reconcile them against the previous
//! evaluation's set afterwards.
//!
//! An entry without a subscriber suspends tracking for nested reads (see
//! [`untracked`]).

use std::cell::RefCell;

use indexmap::IndexSet;

use super::SubscriberId;
use crate::observer::DepId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The evaluating subscriber, or `None` when tracking is suspended.
    subscriber_id: Option<SubscriberId>,
    /// Dependencies read during this evaluation, in first-read order.
    dependencies: IndexSet<DepId>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    exited: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a context in which reads are not tracked.
    pub fn suspend() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: IndexSet::new(),
            });
        });

        Self {
            subscriber_id,
            exited: false,
        }
    }

    /// Leave the context, returning the dependencies it collected.
    pub fn exit(mut self) -> IndexSet<DepId> {
        self.exited = true;
        self.pop()
    }

    fn pop(&self) -> IndexSet<DepId> {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            match popped {
                Some(entry) => {
                    debug_assert_eq!(
                        entry.subscriber_id, self.subscriber_id,
                        "ReactiveContext mismatch: expected {:?}, got {:?}",
                        self.subscriber_id, entry.subscriber_id
                    );
                    entry.dependencies
                }
                None => IndexSet::new(),
            }
        })
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Record a dependency on the current context.
    ///
    /// Returns the current subscriber if this is the first time the
    /// dependency is read in this evaluation.
    pub fn track_dependency(dep_id: DepId) -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let subscriber_id = entry.subscriber_id?;
            entry.dependencies.insert(dep_id).then_some(subscriber_id)
        })
    }

    /// Get the dependencies collected so far in the current context.
    pub fn get_dependencies() -> Vec<DepId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Current nesting depth.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.exited {
            self.pop();
        }
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::suspend();
    f()
}
