//! Observed State
//!
//! This module turns plain data into observable data. Every property of an
//! observed [`Record`] gets its own [`Dep`]; every observed container also
//! carries an [`Observer`] whose dependency tracks its shape.
//!
//! # Reads
//!
//! Reading a property inside an evaluation subscribes the evaluating
//! subscriber to the property and, if the property holds a container, to that
//! container's shape as well. Lists have no per-index dependencies, so
//! reading a list subscribes to its shape and to the shapes of its observed
//! elements.
//!
//! # Writes
//!
//! Writing a property notifies its dependency when the value actually
//! changes. Lists only notify through their mutating methods
//! (`push`, `pop`, `shift`, `unshift`, `splice`, `sort_by`, `reverse`).
//! Adding or removing record properties goes through [`explicit_set`] and
//! [`explicit_delete`], which notify the record's shape dependency.

mod array;
mod dep;
mod observe;
mod traverse;
mod value;

pub use dep::{Dep, DepId};
pub use observe::{
    define_reactive, depend_array, explicit_delete, explicit_set, is_observing, observe, observe_root,
    set_observing, Key, Observer, PropertyOptions,
};
pub use traverse::traverse;
pub use value::{
    default_compare, AccessorGet, AccessorSet, ChangeGuard, Container, List, Record, TreeNode, Value,
};
