//! Observers
//!
//! An [`Observer`] is attached to every container that has been made
//! observable. It owns the container's shape dependency, which notifies when
//! properties are added or removed (or when a list is mutated through one of
//! its intercepted methods), and counts how many consumers use the container
//! as a top-level root.
//!
//! Observing is idempotent: the second call returns the observer attached by
//! the first.

use std::cell::Cell;
use std::rc::Rc;

use super::dep::Dep;
use super::value::{Container, List, Reactivity, Record, Slot, Value};
use crate::error::{warn, ReactiveError};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new observers on this thread.
pub fn set_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|s| s.set(enabled));
}

pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

struct ObserverInner {
    dep: Dep,
    root_count: Cell<usize>,
}

/// Handle to a container's observer.
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    fn new() -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                dep: Dep::new(),
                root_count: Cell::new(0),
            }),
        }
    }

    /// The shape dependency.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Number of consumers observing the container as a root.
    pub fn root_count(&self) -> usize {
        self.inner.root_count.get()
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.inner.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Make a value observable.
///
/// Returns `None` for primitives and tree nodes. Frozen containers, and new
/// containers while observing is switched off, are left alone.
pub fn observe(value: &Value) -> Option<Observer> {
    match value {
        Value::Record(record) => observe_container(record, |observer| {
            record.attach_observer(observer);
            walk(record);
        }),
        Value::List(list) => observe_container(list, |observer| {
            list.attach_observer(observer);
            observe_items(&list.to_vec_untracked());
        }),
        _ => None,
    }
}

/// Make a value observable as a top-level root.
///
/// Roots cannot gain or lose properties through the explicit API.
pub fn observe_root(value: &Value) -> Option<Observer> {
    let observer = observe(value)?;
    observer.inner.root_count.set(observer.root_count() + 1);
    Some(observer)
}

fn observe_container<C: Container>(container: &C, install: impl FnOnce(Observer)) -> Option<Observer> {
    if let Some(existing) = container.observer() {
        return Some(existing);
    }
    if !is_observing() || container.is_frozen() {
        return None;
    }
    let observer = Observer::new();
    install(observer.clone());
    Some(observer)
}

fn walk(record: &Record) {
    for key in record.keys_untracked() {
        define_reactive(record, &key, None, PropertyOptions::default());
    }
}

pub(crate) fn observe_items(items: &[Value]) {
    for item in items {
        observe(item);
    }
}

/// Options for [`define_reactive`].
#[derive(Clone, Default)]
pub struct PropertyOptions {
    /// Invoked before an actual change is applied (e.g. to warn about
    /// mutating a value owned elsewhere).
    pub change_guard: Option<Rc<dyn Fn()>>,
    /// Do not observe the property's value.
    pub shallow: bool,
}

/// Install a tracked property `key` on `record`.
///
/// With `initial == None` the property keeps its current value (read through
/// any custom getter).
pub fn define_reactive(record: &Record, key: &str, initial: Option<Value>, options: PropertyOptions) {
    let existing = record.slot(key);
    let accessor = existing.as_ref().and_then(|s| s.accessor.clone());

    let value = match (initial, &existing) {
        (Some(value), _) => value,
        // A getter-only accessor is not read (and so not observed) up front.
        (None, Some(slot)) => match &slot.accessor {
            Some(a) if a.set.is_none() => Value::Null,
            Some(a) => (a.get)(),
            None => slot.value.clone(),
        },
        (None, None) => Value::Null,
    };

    let child = if options.shallow { None } else { observe(&value) };
    let stored = if accessor.is_some() {
        existing.map(|s| s.value).unwrap_or_default()
    } else {
        value
    };

    record.put_slot(
        key,
        Slot {
            value: stored,
            accessor,
            reactive: Some(Reactivity {
                dep: Rc::new(Dep::new()),
                child,
                shallow: options.shallow,
                guard: options.change_guard,
            }),
        },
    );
}

/// Subscribe the current evaluation to every observed element of `list`,
/// recursing into nested lists.
///
/// Element reads don't go through a property getter, so this is the only
/// way a reader of the list hears about mutations of its elements' shapes.
pub fn depend_array(list: &List) {
    for item in list.to_vec_untracked() {
        let observer = match &item {
            Value::Record(r) => r.observer(),
            Value::List(l) => l.observer(),
            _ => None,
        };
        if let Some(observer) = observer {
            observer.dep().depend();
        }
        if let Value::List(inner) = &item {
            depend_array(inner);
        }
    }
}

/// Key for the explicit set/delete API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(n) => f.write_str(n),
        }
    }
}

/// Set a property or element so that the change is tracked.
///
/// - On a list, the list grows to fit `index` and the element is written
///   through the intercepted splice.
/// - On a record, an existing property is assigned normally; a new property
///   is made reactive and the record's shape dependency notifies.
/// - Adding a property to an observed root is refused with a diagnostic.
pub fn explicit_set(target: &Value, key: impl Into<Key>, value: Value) -> Result<Value, ReactiveError> {
    let key = key.into();
    match (target, key) {
        (Value::List(list), Key::Index(index)) => {
            let len = list.raw_len();
            if index > len {
                list.mutate(|items| items.resize(index, Value::Null));
            }
            list.splice(index, 1, [value.clone()])?;
            Ok(value)
        }
        (Value::List(_), Key::Name(name)) => Err(ReactiveError::InvalidKey(name)),
        (Value::Record(record), key) => {
            let name = key.to_string();
            if record.contains_key(&name) {
                record.set(&name, value.clone())?;
                return Ok(value);
            }
            let observer = record.observer();
            if observer.as_ref().is_some_and(|o| o.root_count() > 0) {
                warn(
                    "Avoid adding reactive properties to a root data object at runtime - \
                     declare it upfront instead.",
                );
                return Ok(value);
            }
            let Some(observer) = observer else {
                record.set(&name, value.clone())?;
                return Ok(value);
            };
            define_reactive(record, &name, Some(value.clone()), PropertyOptions::default());
            observer.dep().notify()?;
            Ok(value)
        }
        (other, _) => {
            warn(&format!(
                "Cannot set reactive property on undefined, null, or primitive value: {other}"
            ));
            Err(ReactiveError::NotAContainer {
                action: "set",
                value: other.to_string(),
            })
        }
    }
}

/// Delete a property or element so that the change is tracked.
pub fn explicit_delete(target: &Value, key: impl Into<Key>) -> Result<(), ReactiveError> {
    let key = key.into();
    match (target, key) {
        (Value::List(list), Key::Index(index)) => {
            if index < list.raw_len() {
                list.splice(index, 1, Vec::new())?;
            }
            Ok(())
        }
        (Value::List(_), Key::Name(name)) => Err(ReactiveError::InvalidKey(name)),
        (Value::Record(record), key) => {
            let name = key.to_string();
            let observer = record.observer();
            if observer.as_ref().is_some_and(|o| o.root_count() > 0) {
                warn("Avoid deleting properties on a root data object - just set it to null.");
                return Ok(());
            }
            if record.remove_slot(&name).is_none() {
                return Ok(());
            }
            match observer {
                Some(observer) => observer.dep().notify(),
                None => Ok(()),
            }
        }
        (other, _) => {
            warn(&format!(
                "Cannot delete reactive property on undefined, null, or primitive value: {other}"
            ));
            Err(ReactiveError::NotAContainer {
                action: "delete",
                value: other.to_string(),
            })
        }
    }
}
