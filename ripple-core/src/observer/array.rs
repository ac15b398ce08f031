//! List Interception
//!
//! The seven mutating list operations run against the backing vector, then
//! observe any inserted elements and notify the list's shape dependency once
//! per operation. On a list that has not been observed they are plain
//! vector operations.

use std::cmp::Ordering;

use super::observe::observe_items;
use super::value::{Container, List, Value};
use crate::error::ReactiveError;

impl List {
    /// Append elements. Returns the new length.
    pub fn push(&self, items: impl IntoIterator<Item = Value>) -> Result<usize, ReactiveError> {
        let inserted: Vec<Value> = items.into_iter().collect();
        let len = self.mutate(|v| {
            v.extend(inserted.iter().cloned());
            v.len()
        });
        self.after_mutation(&inserted)?;
        Ok(len)
    }

    /// Prepend elements, keeping their order. Returns the new length.
    pub fn unshift(&self, items: impl IntoIterator<Item = Value>) -> Result<usize, ReactiveError> {
        let inserted: Vec<Value> = items.into_iter().collect();
        let len = self.mutate(|v| {
            v.splice(0..0, inserted.iter().cloned());
            v.len()
        });
        self.after_mutation(&inserted)?;
        Ok(len)
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Value>, ReactiveError> {
        let removed = self.mutate(Vec::pop);
        self.after_mutation(&[])?;
        Ok(removed)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<Value>, ReactiveError> {
        let removed = self.mutate(|v| (!v.is_empty()).then(|| v.remove(0)));
        self.after_mutation(&[])?;
        Ok(removed)
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// Out-of-range arguments are clamped. Returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>, ReactiveError> {
        let inserted: Vec<Value> = items.into_iter().collect();
        let removed = self.mutate(|v| {
            let start = start.min(v.len());
            let end = start.saturating_add(delete_count).min(v.len());
            v.splice(start..end, inserted.iter().cloned()).collect()
        });
        self.after_mutation(&inserted)?;
        Ok(removed)
    }

    /// Stable sort with the given comparator.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<(), ReactiveError> {
        self.mutate(|v| v.sort_by(compare));
        self.after_mutation(&[])
    }

    /// Sort numbers numerically and everything else by display text.
    pub fn sort(&self) -> Result<(), ReactiveError> {
        self.sort_by(super::value::default_compare)
    }

    pub fn reverse(&self) -> Result<(), ReactiveError> {
        self.mutate(|v| v.reverse());
        self.after_mutation(&[])
    }

    fn after_mutation(&self, inserted: &[Value]) -> Result<(), ReactiveError> {
        let Some(observer) = self.observer() else {
            return Ok(());
        };
        observe_items(inserted);
        observer.dep().notify()
    }
}
