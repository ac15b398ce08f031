//! Observed Values
//!
//! [`Value`] is the closed set of things the engine can hold: primitives,
//! two container kinds ([`Record`] and [`List`]) and opaque tree-description
//! nodes. Containers are reference-counted handles with identity, so two
//! `Value::Record`s are strictly equal only if they point at the same record.
//!
//! Property reads and writes on a record go through its slots. A slot that
//! was made reactive carries a [`Dep`]; reading it inside an evaluation
//! subscribes the evaluating subscriber, writing it notifies.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::dep::Dep;
use super::observe::{depend_array, observe, Observer};
use crate::error::ReactiveError;
use crate::reactive::Runtime;

/// A value that can be held in reactive state.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Record(Record),
    List(List),
    /// Transient tree-description output. Never observed or traversed.
    Node(Rc<TreeNode>),
}

impl Value {
    /// Strict equality: identity for containers and nodes, `NaN != NaN`.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Node(a), Value::Node(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Like [`strict_eq`](Self::strict_eq), but two NaNs are the same value.
    pub fn same_value(&self, other: &Value) -> bool {
        self.strict_eq(other) || (self.is_nan() && other.is_nan())
    }

    fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Records and lists.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Record(_) | Value::List(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Snapshot as JSON without tracking any reads.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Record(r) => Json::Object(
                r.entries_untracked()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
            Value::List(l) => Json::Array(l.to_vec_untracked().iter().map(Value::to_json).collect()),
            Value::Node(n) => serde_json::json!({ "tag": n.tag }),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Record(r) => fmt::Debug::fmt(r, f),
            Value::List(l) => fmt::Debug::fmt(l, f),
            Value::Node(n) => write!(f, "Node({:?})", n.tag),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Record(_) => f.write_str("[record]"),
            Value::List(_) => f.write_str("[list]"),
            Value::Node(n) => write!(f, "<{}>", n.tag),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<TreeNode> for Value {
    fn from(n: TreeNode) -> Self {
        Value::Node(Rc::new(n))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::List(List::from_vec(items.into_iter().map(Value::from).collect())),
            Json::Object(map) => {
                Value::Record(Record::from_pairs(map.into_iter().map(|(k, v)| (k, Value::from(v)))))
            }
        }
    }
}

/// A node produced by render output.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub tag: String,
    pub children: Vec<Value>,
}

impl TreeNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            children: Vec::new(),
        }
    }
}

/// The interception seam shared by both container kinds.
pub trait Container {
    /// The attached observer, if this container has been made observable.
    fn observer(&self) -> Option<Observer>;

    /// Attach an observer. Called once by [`observe`].
    fn attach_observer(&self, observer: Observer);

    /// Frozen containers are never observed or traversed.
    fn is_frozen(&self) -> bool;

    fn freeze(&self);
}

// ----------------------------------------------------------------------------
// Record
// ----------------------------------------------------------------------------

/// Guard invoked before a reactive property accepts a new value.
pub type ChangeGuard = Rc<dyn Fn()>;

/// Getter half of an accessor property.
pub type AccessorGet = Rc<dyn Fn() -> Value>;

/// Setter half of an accessor property.
pub type AccessorSet = Rc<dyn Fn(Value)>;

#[derive(Clone)]
pub(crate) struct Accessor {
    pub(crate) get: AccessorGet,
    pub(crate) set: Option<AccessorSet>,
}

#[derive(Clone)]
pub(crate) struct Reactivity {
    pub(crate) dep: Rc<Dep>,
    pub(crate) child: Option<Observer>,
    pub(crate) shallow: bool,
    pub(crate) guard: Option<ChangeGuard>,
}

#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) value: Value,
    pub(crate) accessor: Option<Accessor>,
    pub(crate) reactive: Option<Reactivity>,
}

impl Slot {
    fn plain(value: Value) -> Self {
        Self {
            value,
            accessor: None,
            reactive: None,
        }
    }
}

#[derive(Default)]
struct RecordInner {
    slots: RefCell<IndexMap<String, Slot>>,
    observer: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// A keyed container.
#[derive(Clone, Default)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let record = Self::new();
        {
            let mut slots = record.inner.slots.borrow_mut();
            for (key, value) in pairs {
                slots.insert(key.into(), Slot::plain(value));
            }
        }
        record
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a property, subscribing the current evaluation to it.
    pub fn get(&self, key: &str) -> Option<Value> {
        let slot = self.inner.slots.borrow().get(key).cloned()?;
        let value = match &slot.accessor {
            Some(accessor) => (accessor.get)(),
            None => slot.value,
        };

        if Runtime::is_tracking() {
            if let Some(reactive) = &slot.reactive {
                reactive.dep.depend();
                if let Some(child) = &reactive.child {
                    child.dep().depend();
                    if let Value::List(list) = &value {
                        depend_array(list);
                    }
                }
            }
        }
        Some(value)
    }

    /// Read a property without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        let slot = self.inner.slots.borrow().get(key).cloned()?;
        Some(match &slot.accessor {
            Some(accessor) => (accessor.get)(),
            None => slot.value,
        })
    }

    /// Write a property.
    ///
    /// Reactive properties notify their subscribers when the value changes.
    /// Writing a key that does not exist yet adds a plain, untracked
    /// property; use [`explicit_set`](super::explicit_set) to add a tracked one.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ReactiveError> {
        let existing = self.inner.slots.borrow().get(key).cloned();
        let Some(slot) = existing else {
            self.inner
                .slots
                .borrow_mut()
                .insert(key.to_owned(), Slot::plain(value));
            return Ok(());
        };

        let Some(reactive) = slot.reactive else {
            match slot.accessor {
                Some(Accessor { set: Some(set), .. }) => set(value),
                Some(_) => {}
                None => self.store(key, value),
            }
            return Ok(());
        };

        let old = match &slot.accessor {
            Some(accessor) => (accessor.get)(),
            None => slot.value,
        };
        if value.same_value(&old) {
            return Ok(());
        }
        if let Some(guard) = &reactive.guard {
            guard();
        }
        match &slot.accessor {
            Some(Accessor { set: Some(set), .. }) => set(value.clone()),
            // Getter without setter: read-only
            Some(_) => return Ok(()),
            None => self.store(key, value.clone()),
        }

        let child = if reactive.shallow { None } else { observe(&value) };
        if let Some(slot) = self.inner.slots.borrow_mut().get_mut(key) {
            if let Some(r) = slot.reactive.as_mut() {
                r.child = child;
            }
        }
        reactive.dep.notify()
    }

    fn store(&self, key: &str, value: Value) {
        if let Some(slot) = self.inner.slots.borrow_mut().get_mut(key) {
            slot.value = value;
        }
    }

    /// Install a custom getter (and optional setter) for `key`.
    ///
    /// If the property is later made reactive, reads and writes keep going
    /// through these functions.
    pub fn define_accessor(&self, key: &str, get: AccessorGet, set: Option<AccessorSet>) {
        let mut slots = self.inner.slots.borrow_mut();
        let slot = slots
            .entry(key.to_owned())
            .or_insert_with(|| Slot::plain(Value::Null));
        slot.accessor = Some(Accessor { get, set });
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.slots.borrow().contains_key(key)
    }

    /// Property names in insertion order.
    ///
    /// Tracks the record's shape, so adding or deleting properties through
    /// the explicit API re-triggers the reader.
    pub fn keys(&self) -> Vec<String> {
        self.track_shape();
        self.inner.slots.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.track_shape();
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn track_shape(&self) {
        if Runtime::is_tracking() {
            if let Some(observer) = self.observer() {
                observer.dep().depend();
            }
        }
    }

    pub(crate) fn keys_untracked(&self) -> Vec<String> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    pub(crate) fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.keys_untracked()
            .into_iter()
            .filter_map(|k| self.get_untracked(&k).map(|v| (k, v)))
            .collect()
    }

    pub(crate) fn slot(&self, key: &str) -> Option<Slot> {
        self.inner.slots.borrow().get(key).cloned()
    }

    pub(crate) fn put_slot(&self, key: &str, slot: Slot) {
        self.inner.slots.borrow_mut().insert(key.to_owned(), slot);
    }

    pub(crate) fn remove_slot(&self, key: &str) -> Option<Slot> {
        self.inner.slots.borrow_mut().shift_remove(key)
    }
}

impl Container for Record {
    fn observer(&self) -> Option<Observer> {
        self.inner.observer.borrow().clone()
    }

    fn attach_observer(&self, observer: Observer) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    fn freeze(&self) {
        self.inner.frozen.set(true);
    }
}

// Containers may reference themselves, so Debug stays shallow.
impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.inner.slots.borrow();
        f.debug_struct("Record")
            .field("keys", &slots.keys().collect::<Vec<_>>())
            .field("observed", &self.inner.observer.borrow().is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// List
// ----------------------------------------------------------------------------

#[derive(Default)]
struct ListInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// An ordered container.
///
/// Element reads track the list's shape dependency. Mutation is only
/// trackable through the intercepted methods in `array.rs` and the explicit
/// set/delete API.
#[derive(Clone, Default)]
pub struct List {
    inner: Rc<ListInner>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        let list = Self::new();
        *list.inner.items.borrow_mut() = items;
        list
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.track_shape();
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.track_shape();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.track_shape();
        self.to_vec_untracked()
    }

    pub(crate) fn to_vec_untracked(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    fn track_shape(&self) {
        if Runtime::is_tracking() {
            if let Some(observer) = self.observer() {
                observer.dep().depend();
            }
        }
    }

    /// Apply a raw mutation to the backing vector.
    ///
    /// The vector is moved out while `f` runs, so comparators may read the
    /// list without a borrow conflict.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let mut items = std::mem::take(&mut *self.inner.items.borrow_mut());
        let result = f(&mut items);
        *self.inner.items.borrow_mut() = items;
        result
    }

    pub(crate) fn raw_len(&self) -> usize {
        self.inner.items.borrow().len()
    }
}

impl Container for List {
    fn observer(&self) -> Option<Observer> {
        self.inner.observer.borrow().clone()
    }

    fn attach_observer(&self, observer: Observer) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    fn freeze(&self) {
        self.inner.frozen.set(true);
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("len", &self.inner.items.borrow().len())
            .field("observed", &self.inner.observer.borrow().is_some())
            .finish()
    }
}

/// Order numbers numerically and everything else by display text.
pub fn default_compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Subscriber;
    use serde_json::json;

    #[test]
    fn strict_equality() {
        let r = Record::new();
        assert!(Value::from(r.clone()).strict_eq(&Value::from(r)));
        assert!(!Value::from(Record::new()).strict_eq(&Value::from(Record::new())));
        assert!(Value::from("a").strict_eq(&Value::from("a")));
        assert!(!Value::from(f64::NAN).strict_eq(&Value::from(f64::NAN)));
        assert!(Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));
        assert!(!Value::from(1).strict_eq(&Value::from("1")));
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let value = Value::from(json!({"a": 1, "items": [true, null, "x"]}));
        let record = value.as_record().unwrap();
        assert_eq!(record.get("a").unwrap().as_number(), Some(1.0));
        let items = record.get("items").unwrap();
        assert_eq!(items.as_list().unwrap().len(), 3);
        assert_eq!(value.to_json(), json!({"a": 1.0, "items": [true, null, "x"]}));
    }

    #[test]
    fn plain_record_get_and_set() {
        let record = Record::new();
        assert!(record.get("missing").is_none());
        record.set("a", Value::from(1)).unwrap();
        record.set("a", Value::from(2)).unwrap();
        assert_eq!(record.get("a").unwrap().as_number(), Some(2.0));
        assert_eq!(record.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn accessors_are_respected() {
        let record = Record::new();
        let backing = Rc::new(Cell::new(3.0));
        let read = backing.clone();
        let write = backing.clone();
        record.define_accessor(
            "x",
            Rc::new(move || Value::from(read.get())),
            Some(Rc::new(move |v: Value| write.set(v.as_number().unwrap_or_default()))),
        );

        assert_eq!(record.get("x").unwrap().as_number(), Some(3.0));
        record.set("x", Value::from(7)).unwrap();
        assert_eq!(backing.get(), 7.0);
    }

    #[test]
    fn debug_is_shallow_for_self_reference() {
        let record = Record::new();
        record.set("me", Value::from(record.clone())).unwrap();
        let text = format!("{:?}", Value::from(record));
        assert!(text.contains("me"));
    }

    #[test]
    fn default_compare_orders_numbers_numerically() {
        assert_eq!(default_compare(&Value::from(2), &Value::from(10)), Ordering::Less);
        assert_eq!(default_compare(&Value::from("b"), &Value::from("a")), Ordering::Greater);
    }

    #[test]
    fn writing_nan_over_nan_notifies_nobody() {
        let value = Value::from(json!({"x": 0}));
        observe(&value);
        let record = value.as_record().cloned().unwrap();
        record.set("x", Value::from(f64::NAN)).unwrap();

        let runs = Rc::new(Cell::new(0));
        let (r, c) = (record.clone(), runs.clone());
        let _reader = Subscriber::builder(move || {
            c.set(c.get() + 1);
            Ok(r.get("x").unwrap_or_default())
        })
        .sync()
        .build()
        .unwrap();
        assert_eq!(runs.get(), 1);

        record.set("x", Value::from(f64::NAN)).unwrap();
        assert_eq!(runs.get(), 1);

        record.set("x", Value::from(1)).unwrap();
        assert_eq!(runs.get(), 2);
    }
}
