//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects dependencies to the
//! subscribers that read them.
//!
//! # How It Works
//!
//! 1. When a subscriber is created, it registers with the runtime.
//!
//! 2. When a dependency is read inside an evaluation, the runtime records the
//!    edge `dependency -> subscriber`.
//!
//! 3. When a dependency notifies, the runtime snapshots its subscribers and
//!    calls `update()` on each. Each subscriber then decides whether to mark
//!    itself dirty (lazy), run inline (sync), or queue itself (default).
//!
//! # Storage
//!
//! Both tables are keyed by id. Dependencies only store subscriber ids and the
//! registry only stores weak references, so the graph never keeps a
//! subscriber (or the closures it owns) alive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use crate::config;
use crate::error::ReactiveError;
use crate::observer::DepId;

/// A trait for types that can be notified when dependencies change.
pub trait Reactive {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Called by a dependency's notify.
    fn update(self: Rc<Self>) -> Result<(), ReactiveError>;

    /// Re-evaluate and fire the effect callback if the value changed.
    fn run(&self) -> Result<(), ReactiveError>;

    /// Hook invoked by the flush right before `run()`.
    fn before_run(&self) {}

    /// Short description used in diagnostics.
    fn description(&self) -> String;
}

#[derive(Default)]
struct Graph {
    /// Subscribers of each live dependency, in subscription order.
    dependencies: HashMap<DepId, IndexSet<SubscriberId>>,
    /// Registered subscribers.
    registry: HashMap<SubscriberId, Weak<dyn Reactive>>,
}

thread_local! {
    static GRAPH: RefCell<Graph> = RefCell::new(Graph::default());
}

/// The reactive runtime.
///
/// All state is thread-local; the type is just a namespace.
pub struct Runtime;

impl Runtime {
    /// Register a reactive value with the runtime.
    pub fn register(reactive: &Rc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        GRAPH.with(|g| {
            g.borrow_mut().registry.insert(id, Rc::downgrade(reactive));
        });
    }

    /// Remove a subscriber from the registry and from the given dependencies.
    ///
    /// Safe to call from destructors, including during thread teardown.
    pub(crate) fn unregister(id: SubscriberId, dependencies: impl IntoIterator<Item = DepId>) {
        let _ = GRAPH.try_with(|g| {
            if let Ok(mut graph) = g.try_borrow_mut() {
                graph.registry.remove(&id);
                for dep in dependencies {
                    if let Some(subs) = graph.dependencies.get_mut(&dep) {
                        subs.shift_remove(&id);
                    }
                }
            }
        });
    }

    pub(crate) fn create_dependency(dep: DepId) {
        GRAPH.with(|g| {
            g.borrow_mut().dependencies.insert(dep, IndexSet::new());
        });
    }

    pub(crate) fn drop_dependency(dep: DepId) {
        let _ = GRAPH.try_with(|g| {
            if let Ok(mut graph) = g.try_borrow_mut() {
                graph.dependencies.remove(&dep);
            }
        });
    }

    /// Record that the current subscriber read `dep`.
    ///
    /// The subscriber is added to the dependency at most once per evaluation.
    pub fn depend(dep: DepId) {
        if let Some(subscriber) = ReactiveContext::track_dependency(dep) {
            Self::subscribe(dep, subscriber);
        }
    }

    /// Add an edge `dep -> subscriber`.
    pub fn subscribe(dep: DepId, subscriber: SubscriberId) {
        GRAPH.with(|g| {
            if let Some(subs) = g.borrow_mut().dependencies.get_mut(&dep) {
                subs.insert(subscriber);
            }
        });
    }

    /// Remove the edge `dep -> subscriber`.
    pub fn unsubscribe(dep: DepId, subscriber: SubscriberId) {
        GRAPH.with(|g| {
            if let Some(subs) = g.borrow_mut().dependencies.get_mut(&dep) {
                subs.shift_remove(&subscriber);
            }
        });
    }

    /// Notify all subscribers of `dep`.
    ///
    /// The subscriber list is snapshotted first, so subscribers may
    /// subscribe or tear down while the notification is in progress. Every
    /// subscriber is updated even if an earlier one fails; the first error is
    /// returned.
    pub fn notify(dep: DepId) -> Result<(), ReactiveError> {
        let mut subscribers: SmallVec<[Rc<dyn Reactive>; 8]> = GRAPH.with(|g| {
            let graph = g.borrow();
            graph
                .dependencies
                .get(&dep)
                .into_iter()
                .flatten()
                .filter_map(|id| graph.registry.get(id).and_then(Weak::upgrade))
                .collect()
        });

        if subscribers.is_empty() {
            return Ok(());
        }

        // Without the queue there is nothing to sort them later, so fire
        // in creation order here.
        if !config::is_async() {
            subscribers.sort_by_key(|s| s.subscriber_id());
        }

        tracing::trace!(dep = dep.raw(), count = subscribers.len(), "notify");

        let mut first_error = None;
        for subscriber in subscribers {
            if let Err(err) = subscriber.update() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of subscribers currently attached to `dep`.
    pub fn subscriber_count(dep: DepId) -> usize {
        GRAPH.with(|g| g.borrow().dependencies.get(&dep).map_or(0, IndexSet::len))
    }

    /// Number of live registered subscribers.
    pub fn registered_count() -> usize {
        GRAPH.with(|g| {
            g.borrow()
                .registry
                .values()
                .filter(|w| w.strong_count() > 0)
                .count()
        })
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct MockReactive {
        id: SubscriberId,
        updates: Cell<usize>,
        log: Rc<RefCell<Vec<SubscriberId>>>,
    }

    impl MockReactive {
        fn new(log: &Rc<RefCell<Vec<SubscriberId>>>) -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                updates: Cell::new(0),
                log: log.clone(),
            })
        }
    }

    impl Reactive for MockReactive {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn update(self: Rc<Self>) -> Result<(), ReactiveError> {
            self.updates.set(self.updates.get() + 1);
            self.log.borrow_mut().push(self.id);
            Ok(())
        }

        fn run(&self) -> Result<(), ReactiveError> {
            Ok(())
        }

        fn description(&self) -> String {
            "mock".into()
        }
    }

    fn register(mock: &Rc<MockReactive>) {
        let reactive: Rc<dyn Reactive> = mock.clone();
        Runtime::register(&reactive);
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = MockReactive::new(&log);
        let b = MockReactive::new(&log);
        register(&a);
        register(&b);

        let dep = DepId::next();
        Runtime::create_dependency(dep);
        Runtime::subscribe(dep, a.id);
        Runtime::subscribe(dep, b.id);
        Runtime::subscribe(dep, a.id);
        assert_eq!(Runtime::subscriber_count(dep), 2);

        Runtime::notify(dep).unwrap();
        assert_eq!(a.updates.get(), 1);
        assert_eq!(b.updates.get(), 1);
    }

    #[test]
    fn sync_mode_notifies_in_creation_order() {
        config::configure(|c| c.async_mode = false);
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = MockReactive::new(&log);
        let second = MockReactive::new(&log);
        register(&first);
        register(&second);

        let dep = DepId::next();
        Runtime::create_dependency(dep);
        Runtime::subscribe(dep, second.id);
        Runtime::subscribe(dep, first.id);

        Runtime::notify(dep).unwrap();
        assert_eq!(*log.borrow(), vec![first.id, second.id]);
    }

    #[test]
    fn dropped_subscribers_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mock = MockReactive::new(&log);
        register(&mock);

        let dep = DepId::next();
        Runtime::create_dependency(dep);
        Runtime::subscribe(dep, mock.id);
        drop(mock);

        Runtime::notify(dep).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(Runtime::registered_count(), 0);
    }

    #[test]
    fn depend_only_tracks_inside_context() {
        let dep = DepId::next();
        Runtime::create_dependency(dep);

        Runtime::depend(dep);
        assert_eq!(Runtime::subscriber_count(dep), 0);

        let id = SubscriberId::new();
        let ctx = ReactiveContext::enter(id);
        Runtime::depend(dep);
        Runtime::depend(dep);
        let collected = ctx.exit();

        assert_eq!(collected.len(), 1);
        assert_eq!(Runtime::subscriber_count(dep), 1);
    }
}
