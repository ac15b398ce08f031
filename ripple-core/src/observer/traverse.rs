//! Deep Traversal
//!
//! Touches every nested property of a value through the tracked read paths,
//! so the current evaluation depends on all of them. Used by deep
//! subscribers.

use std::collections::HashSet;

use super::dep::DepId;
use super::observe::Observer;
use super::value::{Container, Value};

/// Read every reachable property of `value` inside the current evaluation.
///
/// Each observed container is visited once, keyed by its observer's
/// dependency id, so cyclic structures terminate. Frozen containers and tree
/// nodes are skipped.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<DepId>) {
    match value {
        Value::Record(record) => {
            if record.is_frozen() || !first_visit(record.observer(), seen) {
                return;
            }
            for key in record.keys_untracked() {
                if let Some(child) = record.get(&key) {
                    visit(&child, seen);
                }
            }
        }
        Value::List(list) => {
            if list.is_frozen() || !first_visit(list.observer(), seen) {
                return;
            }
            for item in list.to_vec() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}

fn first_visit(observer: Option<Observer>, seen: &mut HashSet<DepId>) -> bool {
    match observer {
        Some(observer) => seen.insert(observer.dep().id()),
        // Only observed containers are deduplicated.
        None => true,
    }
}
