//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values:
//! derived values, user watchers and render effects are all subscribers with
//! different options.
//!
//! # Lifecycle
//!
//! ```text
//! constructed -> evaluated once -> idle -> [notified] -> queued / run inline
//!             -> re-evaluated -> idle -> ... -> torn down
//! ```
//!
//! A `lazy` subscriber starts dirty and is only evaluated when something
//! demands its value.
//!
//! # Dependency Reconciliation
//!
//! Every evaluation collects the dependencies it read. Afterwards the
//! subscriber unsubscribes from the ones the previous evaluation read but
//! this one didn't, so a branch that is no longer taken stops triggering it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use super::scope::{Scope, ScopeInner};
use crate::error::{report_error, ReactiveError};
use crate::observer::{traverse, Dep, DepId, Value};
use crate::scheduler;

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. Ids increase with creation
/// order, which is what the scheduler sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluation function of a subscriber.
pub type Getter = Box<dyn Fn() -> Result<Value, ReactiveError>>;

/// Effect callback, invoked with `(new, old)`.
pub type Callback = Box<dyn Fn(&Value, &Value) -> Result<(), ReactiveError>>;

/// How a subscriber reacts to notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberOptions {
    /// Mark dirty on notify and evaluate on demand.
    pub lazy: bool,
    /// Run inline with the triggering mutation instead of queueing.
    pub sync: bool,
    /// Traverse the produced value so nested mutations are tracked.
    pub deep: bool,
    /// Route evaluation and callback errors to the error handler.
    pub user: bool,
}

struct State {
    deps: IndexSet<DepId>,
    value: Value,
    dirty: bool,
    active: bool,
}

pub(crate) struct SubscriberInner {
    id: SubscriberId,
    getter: Getter,
    callback: Option<Callback>,
    before: Option<Box<dyn Fn()>>,
    options: SubscriberOptions,
    expression: String,
    scope: Option<Weak<ScopeInner>>,
    state: RefCell<State>,
}

impl SubscriberInner {
    /// Run the getter with this subscriber on the context stack and
    /// reconcile dependencies.
    fn evaluate(&self) -> Result<Value, ReactiveError> {
        let ctx = ReactiveContext::enter(self.id);

        let result = match (self.getter)() {
            Ok(value) => Ok(value),
            Err(err) if self.options.user => {
                report_error(&err, &format!("getter for watcher \"{}\"", self.expression));
                Ok(self.state.borrow().value.clone())
            }
            Err(err) => Err(err),
        };

        if self.options.deep {
            if let Ok(value) = &result {
                traverse(value);
            }
        }

        let fresh = ctx.exit();
        self.cleanup_deps(fresh);
        result
    }

    fn cleanup_deps(&self, fresh: IndexSet<DepId>) {
        let stale: Vec<DepId> = {
            let mut state = self.state.borrow_mut();
            if !state.active {
                // Torn down mid-evaluation: drop everything it just read.
                fresh.into_iter().collect()
            } else {
                let previous = std::mem::replace(&mut state.deps, fresh);
                previous
                    .into_iter()
                    .filter(|dep| !state.deps.contains(dep))
                    .collect()
            }
        };
        for dep in stale {
            Runtime::unsubscribe(dep, self.id);
        }
    }

    fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    fn demand(&self) -> Result<Value, ReactiveError> {
        if self.state.borrow().dirty {
            let value = self.evaluate()?;
            let mut state = self.state.borrow_mut();
            state.value = value;
            state.dirty = false;
        }

        if Runtime::is_tracking() {
            let deps: Vec<DepId> = self.state.borrow().deps.iter().copied().collect();
            for dep in deps {
                Runtime::depend(dep);
            }
        }
        Ok(self.state.borrow().value.clone())
    }

    fn add_dependency(&self, dep: &Dep) {
        if self.state.borrow_mut().deps.insert(dep.id()) {
            Runtime::subscribe(dep.id(), self.id);
        }
    }

    fn teardown(&self) {
        if !self.is_active() {
            return;
        }

        // The scope's handle is dropped on return.
        let mut _owned = None;
        if let Some(scope) = self.scope.as_ref().and_then(Weak::upgrade) {
            if !scope.is_destroying() {
                _owned = scope.remove(self.id);
            }
        }

        let deps = {
            let mut state = self.state.borrow_mut();
            state.active = false;
            std::mem::take(&mut state.deps)
        };
        for dep in deps {
            Runtime::unsubscribe(dep, self.id);
        }
        tracing::trace!(id = self.id.raw(), expression = %self.expression, "subscriber torn down");
    }
}

impl Reactive for SubscriberInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn update(self: Rc<Self>) -> Result<(), ReactiveError> {
        if self.options.lazy {
            self.state.borrow_mut().dirty = true;
            Ok(())
        } else if self.options.sync {
            self.run()
        } else {
            scheduler::enqueue(self)
        }
    }

    fn run(&self) -> Result<(), ReactiveError> {
        if !self.is_active() {
            return Ok(());
        }

        let value = self.evaluate()?;
        let old = {
            let mut state = self.state.borrow_mut();
            let changed = !value.strict_eq(&state.value) || value.is_container() || self.options.deep;
            if !changed {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        let Some(callback) = &self.callback else {
            return Ok(());
        };
        match callback(&value, &old) {
            Err(err) if self.options.user => {
                report_error(&err, &format!("callback for watcher \"{}\"", self.expression));
                Ok(())
            }
            other => other,
        }
    }

    fn before_run(&self) {
        if let Some(before) = &self.before {
            before();
        }
    }

    fn description(&self) -> String {
        self.expression.clone()
    }
}

impl Drop for SubscriberInner {
    fn drop(&mut self) {
        let deps = self
            .state
            .try_borrow_mut()
            .map(|mut state| std::mem::take(&mut state.deps))
            .unwrap_or_default();
        Runtime::unregister(self.id, deps);
    }
}

/// A computation that subscribes to the dependencies it reads.
///
/// Cloning the handle shares the subscriber. When the last handle (including
/// the one held by an owning [`Scope`]) is dropped, the subscriber is
/// unregistered.
#[derive(Clone)]
#[must_use = "dropping the last handle unregisters the subscriber"]
pub struct Subscriber {
    inner: Rc<SubscriberInner>,
}

impl Subscriber {
    /// Create a subscriber with the given evaluation function, optional
    /// effect callback and options.
    ///
    /// A subscriber that isn't `lazy` evaluates once before this returns.
    pub fn new<F>(getter: F, callback: Option<Callback>, options: SubscriberOptions) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Result<Value, ReactiveError> + 'static,
    {
        let mut builder = Self::builder(getter).options(options);
        builder.callback = callback;
        builder.build()
    }

    pub fn builder<F>(getter: F) -> SubscriberBuilder
    where
        F: Fn() -> Result<Value, ReactiveError> + 'static,
    {
        SubscriberBuilder {
            getter: Box::new(getter),
            expression: std::any::type_name::<F>().to_owned(),
            callback: None,
            before: None,
            options: SubscriberOptions::default(),
            scope: None,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn options(&self) -> SubscriberOptions {
        self.inner.options
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The cached value, without evaluating or tracking.
    pub fn value(&self) -> Value {
        self.inner.state.borrow().value.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.borrow().dirty
    }

    pub(crate) fn mark_dirty(&self) {
        self.inner.state.borrow_mut().dirty = true;
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Number of dependencies recorded by the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.borrow().deps.len()
    }

    /// Return the current value, evaluating first if dirty.
    ///
    /// When called inside another subscriber's evaluation, that subscriber
    /// also depends on everything this one depends on.
    pub fn demand(&self) -> Result<Value, ReactiveError> {
        self.inner.demand()
    }

    /// Re-evaluate now and fire the callback if the value changed.
    pub fn run(&self) -> Result<(), ReactiveError> {
        self.inner.run()
    }

    /// Subscribe to `dep` outside of an evaluation.
    ///
    /// The edge is dropped again by the next evaluation if that evaluation
    /// does not read `dep`.
    pub fn add_dependency(&self, dep: &Dep) {
        self.inner.add_dependency(dep);
    }

    /// Stop reacting to anything. Idempotent.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub(crate) fn as_reactive(&self) -> Rc<dyn Reactive> {
        self.inner.clone()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("options", &self.inner.options)
            .field("active", &self.is_active())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Builder for [`Subscriber`].
pub struct SubscriberBuilder {
    getter: Getter,
    expression: String,
    callback: Option<Callback>,
    before: Option<Box<dyn Fn()>>,
    options: SubscriberOptions,
    scope: Option<Scope>,
}

impl SubscriberBuilder {
    pub fn callback<C>(mut self, callback: C) -> Self
    where
        C: Fn(&Value, &Value) -> Result<(), ReactiveError> + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn options(mut self, options: SubscriberOptions) -> Self {
        self.options = options;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.options.lazy = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.options.sync = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.options.deep = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.options.user = true;
        self
    }

    /// Hook run by the flush right before each scheduled re-run.
    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Box::new(hook));
        self
    }

    /// Description used in diagnostics.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    /// Let `scope` own the subscriber.
    pub fn scope(mut self, scope: &Scope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    pub fn build(self) -> Result<Subscriber, ReactiveError> {
        let subscriber = self.assemble();
        if !subscriber.options().lazy {
            match subscriber.inner.evaluate() {
                Ok(value) => subscriber.inner.state.borrow_mut().value = value,
                Err(err) => {
                    subscriber.teardown();
                    return Err(err);
                }
            }
        }
        Ok(subscriber)
    }

    /// Create and register the subscriber without evaluating it.
    pub(crate) fn assemble(self) -> Subscriber {
        let options = self.options;
        let inner = Rc::new(SubscriberInner {
            id: SubscriberId::new(),
            getter: self.getter,
            callback: self.callback,
            before: self.before,
            options,
            expression: self.expression,
            scope: self.scope.as_ref().map(Scope::downgrade),
            state: RefCell::new(State {
                deps: IndexSet::new(),
                value: Value::Null,
                dirty: options.lazy,
                active: true,
            }),
        });
        let subscriber = Subscriber { inner };
        Runtime::register(&subscriber.as_reactive());
        if let Some(scope) = &self.scope {
            scope.adopt(subscriber.clone());
        }
        tracing::trace!(
            id = subscriber.id().raw(),
            expression = %subscriber.expression(),
            "subscriber created"
        );
        subscriber
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
