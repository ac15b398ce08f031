//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. It is the render-style subscriber: its evaluation
//! function *is* the side effect, and it has no callback.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-runs in the
//!    next flush (once, however many dependencies changed).
//!
//! 3. Each run tracks a fresh dependency set; dependencies the run no longer
//!    reads are dropped.
//!
//! # Errors
//!
//! Effects are internal subscribers. An error returned by the function is
//! not swallowed: it propagates out of creation, or out of the flush that
//! re-ran the effect.

use std::cell::Cell;
use std::rc::Rc;

use super::scope::Scope;
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::ReactiveError;
use crate::observer::Value;

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let state = Value::from(json!({"count": 0}));
/// observe_root(&state);
/// let record = state.as_record().cloned().unwrap();
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", record.get("count").unwrap_or_default());
///     Ok(())
/// })?;
/// ```
#[derive(Clone)]
#[must_use = "an effect stops when its last handle is dropped, unless a scope owns it"]
pub struct Effect {
    subscriber: Subscriber,
    run_count: Rc<Cell<usize>>,
}

impl Effect {
    /// Create a new effect and run it once.
    pub fn new<F>(run: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Result<(), ReactiveError> + 'static,
    {
        Self::create(run, None, None)
    }

    /// Create an effect with a hook that runs before every scheduled re-run.
    pub fn with_before<F, B>(run: F, before: B) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Result<(), ReactiveError> + 'static,
        B: Fn() + 'static,
    {
        Self::create(run, Some(Box::new(before)), None)
    }

    /// Create an effect owned by `scope`.
    pub fn in_scope<F>(scope: &Scope, run: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Result<(), ReactiveError> + 'static,
    {
        Self::create(run, None, Some(scope))
    }

    fn create<F>(run: F, before: Option<Box<dyn Fn()>>, scope: Option<&Scope>) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Result<(), ReactiveError> + 'static,
    {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();
        let mut builder = Subscriber::builder(move || {
            counter.set(counter.get() + 1);
            run().map(|()| Value::Null)
        })
        .expression(std::any::type_name::<F>());

        if let Some(before) = before {
            builder = builder.before(before);
        }
        if let Some(scope) = scope {
            builder = builder.scope(scope);
        }

        Ok(Self {
            subscriber: builder.build()?,
            run_count,
        })
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// Run the effect now, outside the scheduler.
    pub fn execute(&self) -> Result<(), ReactiveError> {
        self.subscriber.run()
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again.
    pub fn dispose(&self) {
        self.subscriber.teardown();
    }

    pub fn is_disposed(&self) -> bool {
        !self.subscriber.is_active()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.subscriber.dependency_count()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.subscriber_id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{observe, Record};
    use crate::scheduler::run_pending;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        let value = Value::from(value);
        observe(&value);
        value.as_record().cloned().unwrap()
    }

    #[test]
    fn effect_runs_on_creation() {
        let effect = Effect::new(|| Ok(())).unwrap();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_once_per_flush() {
        let state = record(json!({"a": 1, "b": 2}));
        let s = state.clone();
        let effect = Effect::new(move || {
            s.get("a");
            s.get("b");
            Ok(())
        })
        .unwrap();
        assert_eq!(effect.dependency_count(), 2);

        state.set("a", Value::from(10)).unwrap();
        state.set("b", Value::from(20)).unwrap();
        assert_eq!(effect.run_count(), 1);

        run_pending();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let state = record(json!({"a": 1}));
        let s = state.clone();
        let effect = Effect::new(move || {
            s.get("a");
            Ok(())
        })
        .unwrap();

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(effect.dependency_count(), 0);

        state.set("a", Value::from(2)).unwrap();
        run_pending();
        effect.execute().unwrap();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn before_hook_runs_ahead_of_scheduled_runs() {
        let state = record(json!({"a": 1}));
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let (s, l1, l2) = (state.clone(), log.clone(), log.clone());
        let _effect = Effect::with_before(
            move || {
                s.get("a");
                l1.borrow_mut().push("run");
                Ok(())
            },
            move || l2.borrow_mut().push("before"),
        )
        .unwrap();

        state.set("a", Value::from(2)).unwrap();
        run_pending();
        assert_eq!(*log.borrow(), vec!["run", "before", "run"]);
    }

    #[test]
    fn creation_errors_propagate() {
        let result = Effect::new(|| Err(ReactiveError::msg("render failed")));
        assert!(result.is_err());
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| Ok(())).unwrap();
        let effect2 = effect1.clone();

        assert_eq!(effect1.subscriber_id(), effect2.subscriber_id());
        effect1.execute().unwrap();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
